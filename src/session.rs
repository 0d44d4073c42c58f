//! # Run Session State Machine
//!
//! Mutable state for the single in-progress run: lifecycle status, running
//! totals (distance, duration, pace, max speed) and the route buffer.
//!
//! Exactly one instance is live per device. It is owned and mutated by the
//! [`TrackerController`](crate::tracker::TrackerController); everything
//! else observes immutable [`RunSnapshot`] copies.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle → Running ⇄ Paused
//!          │          │
//!          └──→ Stopped ──(reset)──→ Idle
//! ```
//!
//! Pausing freezes the duration timer: wall time spent paused is excluded
//! from `duration_seconds`, while `started_at_ms` always remains the true
//! start instant of the run.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::geo_utils::haversine_distance_m;
use crate::GeoPoint;

/// Conversion factor from m/s to km/h.
const MPS_TO_KMH: f64 = 3.6;

/// Lifecycle status of the active run session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// No run in progress; all fields at defaults.
    Idle,
    /// Accepting location samples and timer ticks.
    Running,
    /// Timer frozen, samples rejected; accumulated values retained.
    Paused,
    /// Run finished; fields frozen for read until `reset()`.
    Stopped,
}

/// Immutable snapshot of the in-progress run, safe to hand to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    /// Accumulated distance in meters.
    pub distance_m: f64,
    /// Elapsed running time in seconds (paused time excluded).
    pub duration_s: u32,
    /// Pace in seconds per kilometer; 0.0 means "undefined" (no distance yet).
    pub pace_s_per_km: f64,
    /// Maximum observed instantaneous speed in km/h.
    pub max_speed_kmh: f64,
    /// Route captured so far, in arrival order.
    pub route: Vec<GeoPoint>,
    /// Wall-clock start of the run in epoch milliseconds, if started.
    pub started_at_ms: Option<i64>,
}

/// Mutable state of the active run.
///
/// All mutation goes through the lifecycle methods and the per-sample /
/// per-tick update contracts below.
#[derive(Debug)]
pub struct RunSessionState {
    status: RunStatus,
    distance_m: f64,
    duration_s: u32,
    pace_s_per_km: f64,
    max_speed_kmh: f64,
    route: Vec<GeoPoint>,
    started_at_ms: Option<i64>,

    /// Total wall time spent paused so far, in ms.
    paused_total_ms: i64,
    /// Pause entry instant while `Paused`.
    paused_at_ms: Option<i64>,
    /// Previous accepted sample, used for distance deltas.
    last_point: Option<GeoPoint>,
}

impl Default for RunSessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSessionState {
    /// Create a fresh state in `Idle` with all fields at defaults.
    pub fn new() -> Self {
        Self {
            status: RunStatus::Idle,
            distance_m: 0.0,
            duration_s: 0,
            pace_s_per_km: 0.0,
            max_speed_kmh: 0.0,
            route: Vec::new(),
            started_at_ms: None,
            paused_total_ms: 0,
            paused_at_ms: None,
            last_point: None,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn duration_s(&self) -> u32 {
        self.duration_s
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    /// Take an immutable snapshot of the current state.
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            status: self.status,
            distance_m: self.distance_m,
            duration_s: self.duration_s,
            pace_s_per_km: self.pace_s_per_km,
            max_speed_kmh: self.max_speed_kmh,
            route: self.route.clone(),
            started_at_ms: self.started_at_ms,
        }
    }

    // ========================================================================
    // Lifecycle transitions
    // ========================================================================

    /// Begin a new run at `now_ms`.
    ///
    /// Valid from `Idle` or `Stopped`; resets every accumulated value.
    pub fn start(&mut self, now_ms: i64) -> Result<()> {
        match self.status {
            RunStatus::Idle | RunStatus::Stopped => {
                *self = Self::new();
                self.status = RunStatus::Running;
                self.started_at_ms = Some(now_ms);
                Ok(())
            }
            status => Err(TrackError::InvalidTransition {
                operation: "start",
                status,
            }),
        }
    }

    /// Freeze the duration timer and suspend accumulation.
    ///
    /// Valid only from `Running`. The route buffer and accumulated
    /// distance are retained.
    pub fn pause(&mut self, now_ms: i64) -> Result<()> {
        match self.status {
            RunStatus::Running => {
                self.status = RunStatus::Paused;
                self.paused_at_ms = Some(now_ms);
                Ok(())
            }
            status => Err(TrackError::InvalidTransition {
                operation: "pause",
                status,
            }),
        }
    }

    /// Resume the timer and accumulation without resetting anything.
    ///
    /// Valid only from `Paused`.
    pub fn resume(&mut self, now_ms: i64) -> Result<()> {
        match self.status {
            RunStatus::Paused => {
                if let Some(paused_at) = self.paused_at_ms.take() {
                    self.paused_total_ms += (now_ms - paused_at).max(0);
                }
                self.status = RunStatus::Running;
                Ok(())
            }
            status => Err(TrackError::InvalidTransition {
                operation: "resume",
                status,
            }),
        }
    }

    /// End the run, freezing all fields for read.
    ///
    /// Valid from `Running` or `Paused`. A final duration/pace update is
    /// applied when stopping from `Running` so the frozen values reflect
    /// the stop instant. The caller decides whether to persist or discard.
    pub fn stop(&mut self, now_ms: i64) -> Result<()> {
        match self.status {
            RunStatus::Running => {
                self.update_clock(now_ms);
                self.status = RunStatus::Stopped;
                Ok(())
            }
            RunStatus::Paused => {
                if let Some(paused_at) = self.paused_at_ms.take() {
                    self.paused_total_ms += (now_ms - paused_at).max(0);
                }
                self.status = RunStatus::Stopped;
                Ok(())
            }
            status => Err(TrackError::InvalidTransition {
                operation: "stop",
                status,
            }),
        }
    }

    /// Clear everything back to `Idle` defaults. Valid from any state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // ========================================================================
    // Update contracts
    // ========================================================================

    /// Apply one accepted location sample.
    ///
    /// Appends the fix to the route unconditionally (the very first sample
    /// has no predecessor and contributes no distance), accumulates the
    /// Haversine delta from the previous sample, and folds an optional
    /// instantaneous speed (m/s) into the max-speed watermark.
    ///
    /// Raw per-sample GPS noise is summed directly; any jitter filtering is
    /// the location feed's responsibility.
    ///
    /// Returns `false` without touching state when not `Running`.
    pub fn record_sample(&mut self, point: GeoPoint, speed_mps: Option<f64>) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }

        self.route.push(point);

        if let Some(prev) = self.last_point {
            self.distance_m += haversine_distance_m(&prev, &point);
        }

        if let Some(speed) = speed_mps {
            if speed >= 0.0 {
                self.max_speed_kmh = self.max_speed_kmh.max(speed * MPS_TO_KMH);
            }
        }

        self.last_point = Some(point);
        true
    }

    /// Apply one duration/pace timer tick at `now_ms`.
    ///
    /// Returns `false` without touching state when not `Running`.
    pub fn tick(&mut self, now_ms: i64) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        self.update_clock(now_ms);
        true
    }

    fn update_clock(&mut self, now_ms: i64) {
        let Some(started_at) = self.started_at_ms else {
            return;
        };

        let elapsed_ms = (now_ms - started_at - self.paused_total_ms).max(0);
        self.duration_s = (elapsed_ms / 1000) as u32;

        // Pace only becomes defined once there is distance; until then the
        // prior value (0.0 initially) is kept for display as "undefined".
        if self.distance_m > 0.0 {
            self.pace_s_per_km = (self.duration_s as f64 / (self.distance_m / 1000.0)).round();
        }
    }
}
