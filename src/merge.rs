//! # Guest Data Merge
//!
//! Moves everything recorded under the guest profile into a signed-in
//! account: sessions are re-assigned to the new owner, the guest lifetime
//! stats are folded into the account's row, reward records are copied
//! over, and an optional secondary store receives best-effort mirrors of
//! the merged sessions.
//!
//! The merge is per-record fault tolerant: a failure on one record is
//! collected into the report and the remaining records still go through.

use log::{info, warn};

use crate::error::{Result, TrackError};
use crate::stats::UserStats;
use crate::store::SessionStore;

/// Upper bound on guest sessions considered by one merge pass.
const MERGE_BATCH_LIMIT: u32 = 1_000;

/// What one merge pass accomplished.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// Sessions re-assigned to the target user.
    pub sessions_merged: u32,
    /// Reward records copied to the target user.
    pub rewards_merged: u32,
    /// Per-record failures, in encounter order. Empty on a clean merge.
    pub errors: Vec<String>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Merge guest-profile data in `store` into the `user_id` account.
///
/// `mirror`, when given, receives a copy of each merged session; mirror
/// failures are logged and collected but never abort the merge. `now_ms`
/// stamps the copied reward records. Fails up front with
/// [`TrackError::Config`] on an empty target user id.
pub fn merge_guest_data(
    store: &mut dyn SessionStore,
    mirror: Option<&mut dyn SessionStore>,
    user_id: &str,
    now_ms: i64,
) -> Result<MergeReport> {
    if user_id.trim().is_empty() {
        return Err(TrackError::config("merge target user id is empty"));
    }

    let mut report = MergeReport::default();
    let guest_sessions = store.load_sessions(None, MERGE_BATCH_LIMIT)?;
    let mut mirror = mirror;

    for session in &guest_sessions {
        match store.reassign_session(&session.id, user_id) {
            Ok(()) => report.sessions_merged += 1,
            Err(err) => {
                report
                    .errors
                    .push(format!("session {}: {err}", session.id));
                continue;
            }
        }

        if let Some(mirror) = mirror.as_deref_mut() {
            // Mirror with an empty route rather than dropping the session
            // when the route rows cannot be read.
            let route = match store.load_route(&session.id) {
                Ok(route) => route,
                Err(err) => {
                    warn!("route load failed for {}: {err}", session.id);
                    report.errors.push(format!("route {}: {err}", session.id));
                    Vec::new()
                }
            };
            let mut owned = session.clone();
            owned.user_id = Some(user_id.to_string());
            if let Err(err) = mirror.save_session(&owned, &route) {
                warn!("session mirror failed for {}: {err}", session.id);
                report
                    .errors
                    .push(format!("mirror session {}: {err}", session.id));
            }
        }
    }

    // Fold the guest lifetime accumulator into the target row; the
    // reassigned sessions are otherwise invisible to stats and reward
    // evaluation. The guest row is zeroed afterwards.
    let guest_stats = store.load_stats(None)?;
    if guest_stats != UserStats::default() {
        let target = store.load_stats(Some(user_id))?;
        store.save_stats(Some(user_id), &fold_stats(&target, &guest_stats))?;
        store.save_stats(None, &UserStats::default())?;
    }

    // Copy, not move: the guest rows stay behind and the unique constraint
    // makes a re-run of the merge a no-op.
    let guest_rewards = store.load_achieved_reward_ids(None)?;
    let already_owned = store.load_achieved_reward_ids(Some(user_id))?;
    for reward_id in &guest_rewards {
        if already_owned.contains(reward_id) {
            continue;
        }
        match store.save_reward_record(Some(user_id), reward_id, now_ms) {
            Ok(()) => report.rewards_merged += 1,
            Err(err) => report.errors.push(format!("reward {reward_id}: {err}")),
        }
    }

    info!(
        "merged guest data into {user_id}: {} sessions, {} rewards, {} errors",
        report.sessions_merged,
        report.rewards_merged,
        report.errors.len()
    );
    Ok(report)
}

/// Combine two lifetime accumulators: totals summed, watermarks maxed.
///
/// The streak cannot be recomputed without replaying every session day,
/// so the larger of the two streaks is kept.
fn fold_stats(target: &UserStats, guest: &UserStats) -> UserStats {
    UserStats {
        total_distance_m: target.total_distance_m + guest.total_distance_m,
        total_time_s: target.total_time_s + guest.total_time_s,
        total_runs: target.total_runs + guest.total_runs,
        max_speed_kmh: target.max_speed_kmh.max(guest.max_speed_kmh),
        last_run_date_ms: target.last_run_date_ms.max(guest.last_run_date_ms),
        streak_days: target.streak_days.max(guest.streak_days),
    }
}
