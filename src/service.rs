//! # Run Recorder
//!
//! Finalizes a stopped run snapshot into a persisted [`RunningSession`] and
//! folds it into the user's cumulative state:
//!
//! 1. discard runs shorter than the minimum save distance
//! 2. save the session and route to the primary (local) store
//! 3. mirror the write to an optional secondary store, best effort
//! 4. update and save the cumulative [`UserStats`]
//! 5. evaluate the reward catalog and persist newly unlocked rewards
//!
//! Primary-store failures propagate; mirror failures are logged and
//! swallowed so a flaky network can never lose a local run.

use log::{info, warn};
use uuid::Uuid;

use crate::error::{Result, TrackError};
use crate::rewards::{self, RewardDefinition};
use crate::session::{RunSnapshot, RunStatus};
use crate::stats::{update_stats, UserStats};
use crate::store::SessionStore;
use crate::tracker::TrackerConfig;
use crate::{RunningSession, SessionType};

/// Everything that resulted from saving one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session: RunningSession,
    /// Cumulative stats after folding this run in.
    pub stats: UserStats,
    /// Rewards newly unlocked by this run, in catalog order.
    pub new_rewards: Vec<RewardDefinition>,
}

/// Result of offering a stopped run for persistence.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// The run was persisted; stats and rewards were updated.
    Saved(Box<RunOutcome>),
    /// The run was below the minimum save distance and was discarded.
    /// Nothing was written.
    Discarded { distance_m: f64 },
}

/// Persists finished runs and maintains the per-user cumulative state.
pub struct RunRecorder<S: SessionStore> {
    store: S,
    mirror: Option<Box<dyn SessionStore>>,
    config: TrackerConfig,
}

impl<S: SessionStore> RunRecorder<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, TrackerConfig::default())
    }

    pub fn with_config(store: S, config: TrackerConfig) -> Self {
        Self {
            store,
            mirror: None,
            config,
        }
    }

    /// Attach a secondary store that mirrors every write, best effort.
    ///
    /// Guest data is never mirrored; the mirror only receives writes for
    /// authenticated users.
    pub fn with_mirror(mut self, mirror: Box<dyn SessionStore>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Finalize a stopped snapshot and run the full save pipeline.
    ///
    /// `now_ms` stamps the session end and any reward records. Fails with
    /// [`TrackError::InvalidTransition`] unless the snapshot is `Stopped`.
    pub fn record_run(
        &mut self,
        snapshot: &RunSnapshot,
        user_id: Option<&str>,
        session_type: SessionType,
        now_ms: i64,
    ) -> Result<SaveOutcome> {
        if snapshot.status != RunStatus::Stopped {
            return Err(TrackError::InvalidTransition {
                operation: "save",
                status: snapshot.status,
            });
        }

        if snapshot.distance_m < self.config.min_save_distance_m {
            info!(
                "discarding {:.1} m run below the {:.0} m save threshold",
                snapshot.distance_m, self.config.min_save_distance_m
            );
            return Ok(SaveOutcome::Discarded {
                distance_m: snapshot.distance_m,
            });
        }

        let session = self.finalize(snapshot, user_id, session_type, now_ms);

        // Primary save must succeed; everything downstream keys off it.
        self.store.save_session(&session, &snapshot.route)?;

        if user_id.is_some() {
            if let Some(mirror) = self.mirror.as_deref_mut() {
                if let Err(err) = mirror.save_session(&session, &snapshot.route) {
                    warn!("session mirror failed for {}: {err}", session.id);
                }
            }
        }

        let previous = self.store.load_stats(user_id)?;
        let stats = update_stats(&previous, &session);
        self.store.save_stats(user_id, &stats)?;

        let achieved = self.store.load_achieved_reward_ids(user_id)?;
        let evaluation = rewards::evaluate(&stats, &achieved);
        for reward in &evaluation.new_rewards {
            self.store.save_reward_record(user_id, &reward.id, now_ms)?;
        }

        if user_id.is_some() {
            if let Some(mirror) = self.mirror.as_deref_mut() {
                if let Err(err) = mirror.save_stats(user_id, &stats) {
                    warn!("stats mirror failed: {err}");
                }
                for reward in &evaluation.new_rewards {
                    if let Err(err) = mirror.save_reward_record(user_id, &reward.id, now_ms) {
                        warn!("reward mirror failed for {}: {err}", reward.id);
                    }
                }
            }
        }

        info!(
            "saved run {} ({:.0} m, {} s, {} new rewards)",
            session.id,
            session.distance_m,
            session.duration_s,
            evaluation.new_rewards.len()
        );

        Ok(SaveOutcome::Saved(Box::new(RunOutcome {
            session,
            stats,
            new_rewards: evaluation.new_rewards,
        })))
    }

    /// Build the immutable session record from a stopped snapshot.
    fn finalize(
        &self,
        snapshot: &RunSnapshot,
        user_id: Option<&str>,
        session_type: SessionType,
        now_ms: i64,
    ) -> RunningSession {
        let start_time_s = snapshot
            .started_at_ms
            .map(|ms| ms / 1000)
            .unwrap_or_else(|| now_ms / 1000 - i64::from(snapshot.duration_s));

        RunningSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.map(String::from),
            session_type,
            distance_m: snapshot.distance_m,
            duration_s: snapshot.duration_s,
            avg_pace_s_per_km: (snapshot.distance_m > 0.0).then_some(snapshot.pace_s_per_km),
            max_speed_kmh: (snapshot.max_speed_kmh > 0.0).then_some(snapshot.max_speed_kmh),
            calories: Some(self.estimate_calories(snapshot.duration_s)),
            start_time_s,
            end_time_s: Some(now_ms / 1000),
        }
    }

    /// Flat MET-based estimate: weight × MET × hours.
    fn estimate_calories(&self, duration_s: u32) -> i32 {
        let hours = f64::from(duration_s) / 3600.0;
        (self.config.weight_kg * self.config.met * hours).round() as i32
    }
}
