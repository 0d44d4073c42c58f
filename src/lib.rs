//! # Run Tracker
//!
//! Live GPS run tracking and achievement evaluation for a mobile running app.
//!
//! This library provides:
//! - A run session state machine fed by location samples and timer ticks
//! - Haversine-based distance, pace and speed metrics
//! - Cumulative per-user statistics with consecutive-day streak tracking
//! - A tiered reward catalog evaluated against those statistics
//! - SQLite-backed persistence for sessions, routes, stats and rewards
//!
//! The embedding runtime (the mobile shell) owns the clock, the location
//! provider and the 1-second timer; the engine never reads wall time itself.
//! Every operation takes explicit timestamps, which keeps the whole core
//! deterministic and testable.
//!
//! ## Quick Start
//!
//! ```rust
//! use run_tracker::{LocationSample, TrackerController};
//! # use run_tracker::{LocationFeed, Result};
//! # struct Feed;
//! # impl LocationFeed for Feed {
//! #     fn permission_granted(&self) -> bool { true }
//! #     fn subscribe(&mut self, _: u32, _: f64) -> Result<()> { Ok(()) }
//! #     fn unsubscribe(&mut self) {}
//! # }
//!
//! let mut tracker = TrackerController::new(Feed);
//! tracker.start(0)?;
//! tracker.handle_sample(LocationSample::new(51.5074, -0.1278, Some(3.0), 0));
//! tracker.handle_tick(5_000);
//! tracker.handle_sample(LocationSample::new(51.5080, -0.1290, Some(3.2), 5_000));
//! tracker.stop(10_000)?;
//!
//! let run = tracker.snapshot();
//! println!("{:.0} m in {} s", run.distance_m, run.duration_s);
//! # Ok::<(), run_tracker::TrackError>(())
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrackError};

// Geographic utilities (Haversine distance)
pub mod geo_utils;
pub use geo_utils::{haversine_distance_m, route_distance_m, EARTH_RADIUS_M};

// Run session state machine
pub mod session;
pub use session::{RunSessionState, RunSnapshot, RunStatus};

// Tracker controller (location feed + timer orchestration)
pub mod tracker;
pub use tracker::{LocationFeed, LocationSample, SnapshotObserver, TrackerConfig, TrackerController};

// Cumulative statistics and streak tracking
pub mod stats;
pub use stats::{update_stats, UserStats};

// Reward catalog and evaluation
pub mod rewards;
pub use rewards::{
    evaluate, RewardCategory, RewardDefinition, RewardEvaluation, RewardProgress, REWARD_CATALOG,
};

// Persistence (SessionStore contract + SQLite implementation)
pub mod store;
pub use store::{DailySummary, PeriodStats, SessionStore, SqliteStore};

// Recording service: finalize, persist, update stats, evaluate rewards
pub mod service;
pub use service::{RunRecorder, RunOutcome, SaveOutcome};

// Guest → account data merge
pub mod merge;
pub use merge::{merge_guest_data, MergeReport};

// ============================================================================
// Core types
// ============================================================================

/// A single geographic fix on a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Epoch milliseconds at which the fix was taken.
    pub timestamp_ms: i64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64, timestamp_ms: i64) -> Self {
        Self {
            lat,
            lng,
            timestamp_ms,
        }
    }

    /// Whether the coordinates are finite and within valid ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Kind of run a session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Free solo run.
    Solo,
    /// Run along a predefined course.
    Course,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Solo => "solo",
            SessionType::Course => "course",
        }
    }

    /// Parse a stored type string, defaulting unknown values to `Solo`.
    pub fn from_str_or_solo(s: &str) -> Self {
        match s {
            "course" => SessionType::Course,
            _ => SessionType::Solo,
        }
    }
}

/// A finalized, persisted run.
///
/// Immutable once created; the only later mutation is the owner
/// re-assignment performed by the guest→account merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningSession {
    /// Unique session id (UUID v4).
    pub id: String,
    /// Owning user, or `None` for the guest profile.
    pub user_id: Option<String>,
    pub session_type: SessionType,
    /// Total distance in meters.
    pub distance_m: f64,
    /// Running time in seconds (paused time excluded).
    pub duration_s: u32,
    /// Average pace in seconds per kilometer, when distance was covered.
    pub avg_pace_s_per_km: Option<f64>,
    /// Fastest instantaneous speed in km/h, when the feed reported speeds.
    pub max_speed_kmh: Option<f64>,
    /// Estimated calories burned.
    pub calories: Option<i32>,
    /// Wall-clock start in epoch seconds.
    pub start_time_s: i64,
    /// Wall-clock end in epoch seconds.
    pub end_time_s: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_validity() {
        assert!(GeoPoint::new(51.5074, -0.1278, 0).is_valid());
        assert!(GeoPoint::new(-90.0, 180.0, 0).is_valid());
        assert!(!GeoPoint::new(90.5, 0.0, 0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5, 0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0, 0).is_valid());
    }

    #[test]
    fn test_session_type_strings() {
        assert_eq!(SessionType::Solo.as_str(), "solo");
        assert_eq!(SessionType::Course.as_str(), "course");
        assert_eq!(SessionType::from_str_or_solo("course"), SessionType::Course);
        assert_eq!(SessionType::from_str_or_solo("solo"), SessionType::Solo);
        assert_eq!(SessionType::from_str_or_solo("garbage"), SessionType::Solo);
    }

    #[test]
    fn test_running_session_serde_round_trip() {
        let session = RunningSession {
            id: "abc".to_string(),
            user_id: Some("user-1".to_string()),
            session_type: SessionType::Course,
            distance_m: 5_000.0,
            duration_s: 1_800,
            avg_pace_s_per_km: Some(360.0),
            max_speed_kmh: Some(12.5),
            calories: Some(210),
            start_time_s: 1_700_000_000,
            end_time_s: Some(1_700_001_800),
        };

        let json = serde_json::to_string(&session).unwrap();
        let back: RunningSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
