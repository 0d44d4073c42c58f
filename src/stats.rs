//! # Stats Aggregator
//!
//! Cumulative lifetime statistics per user, updated after every completed
//! and saved session. [`update_stats`] is pure over its two inputs; loading
//! and saving the row is the store's job.
//!
//! ## Streak days
//!
//! The streak counts consecutive local calendar days with at least one
//! completed run. Session start times are truncated to the local-day
//! boundary (midnight) before comparison:
//!
//! - first run ever → streak = 1
//! - exactly one day after the last run day → streak + 1
//! - more than one day after → streak broken, back to 1
//! - same day (second run) → unchanged
//! - *before* the last run day (clock skew, backfilled insert) → treated
//!   as same-day, unchanged

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::RunningSession;

/// One calendar day in milliseconds.
pub const DAY_MS: i64 = 86_400_000;

/// Cumulative lifetime statistics for one user identifier.
///
/// Created lazily on the first saved session (the store hands out a zeroed
/// default when no row exists); never deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    /// Total distance across all runs, in meters.
    pub total_distance_m: f64,
    /// Total running time across all runs, in seconds.
    pub total_time_s: u64,
    /// Number of completed runs.
    pub total_runs: u32,
    /// Fastest instantaneous speed ever observed, in km/h.
    pub max_speed_kmh: f64,
    /// Local-day boundary (epoch ms) of the most recent run, if any.
    pub last_run_date_ms: Option<i64>,
    /// Consecutive calendar days with at least one run.
    pub streak_days: u32,
}

/// Fold a completed session into the cumulative statistics.
pub fn update_stats(previous: &UserStats, session: &RunningSession) -> UserStats {
    let run_day_ms = local_day_start_ms(session.start_time_s * 1000);

    UserStats {
        total_distance_m: previous.total_distance_m + session.distance_m,
        total_time_s: previous.total_time_s + u64::from(session.duration_s),
        total_runs: previous.total_runs + 1,
        max_speed_kmh: previous.max_speed_kmh.max(session.max_speed_kmh.unwrap_or(0.0)),
        streak_days: advance_streak(previous.last_run_date_ms, previous.streak_days, run_day_ms),
        last_run_date_ms: Some(run_day_ms),
    }
}

/// Apply the streak rules given day-truncated timestamps.
pub fn advance_streak(last_run_day_ms: Option<i64>, prev_streak: u32, run_day_ms: i64) -> u32 {
    let Some(last_day_ms) = last_run_day_ms else {
        return 1;
    };

    let diff = run_day_ms - last_day_ms;
    if diff == DAY_MS {
        prev_streak + 1
    } else if diff > DAY_MS {
        1
    } else {
        // Same day, or a negative diff from an out-of-order insert; both
        // leave the streak unchanged.
        prev_streak
    }
}

/// Truncate an epoch-ms timestamp to the local-day boundary (midnight).
///
/// Falls back to UTC-day truncation for instants the local timezone cannot
/// represent (DST gaps).
pub fn local_day_start_ms(ts_ms: i64) -> i64 {
    let midnight = Local
        .timestamp_millis_opt(ts_ms)
        .single()
        .map(|dt| dt.date_naive())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());

    match midnight {
        Some(dt) => dt.timestamp_millis(),
        None => ts_ms - ts_ms.rem_euclid(DAY_MS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunningSession, SessionType};

    fn session(start_time_s: i64, distance_m: f64, duration_s: u32) -> RunningSession {
        RunningSession {
            id: "s1".to_string(),
            user_id: None,
            session_type: SessionType::Solo,
            distance_m,
            duration_s,
            avg_pace_s_per_km: None,
            max_speed_kmh: Some(11.5),
            calories: None,
            start_time_s,
            end_time_s: Some(start_time_s + i64::from(duration_s)),
        }
    }

    #[test]
    fn test_totals_accumulate() {
        let first = session(1_700_000_000, 5_000.0, 1_800);
        let stats = update_stats(&UserStats::default(), &first);

        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.total_distance_m, 5_000.0);
        assert_eq!(stats.total_time_s, 1_800);
        assert_eq!(stats.streak_days, 1);

        let second = session(1_700_000_000 + 7_200, 3_000.0, 1_200);
        let stats = update_stats(&stats, &second);

        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.total_distance_m, 8_000.0);
        assert_eq!(stats.total_time_s, 3_000);
    }

    #[test]
    fn test_max_speed_keeps_watermark() {
        let mut previous = UserStats {
            max_speed_kmh: 15.0,
            ..UserStats::default()
        };
        let slow = session(1_700_000_000, 1_000.0, 600);
        previous = update_stats(&previous, &slow);
        assert_eq!(previous.max_speed_kmh, 15.0);

        let mut fast = session(1_700_010_000, 1_000.0, 600);
        fast.max_speed_kmh = Some(17.2);
        previous = update_stats(&previous, &fast);
        assert_eq!(previous.max_speed_kmh, 17.2);
    }

    #[test]
    fn test_missing_session_max_speed_counts_as_zero() {
        let mut run = session(1_700_000_000, 1_000.0, 600);
        run.max_speed_kmh = None;
        let stats = update_stats(&UserStats::default(), &run);
        assert_eq!(stats.max_speed_kmh, 0.0);
    }

    #[test]
    fn test_streak_boundaries() {
        // Next-day extends, two-days-later resets, same-day unchanged.
        let day = local_day_start_ms(1_705_147_200_000); // 2024-01-13 12:00 UTC

        assert_eq!(advance_streak(None, 0, day), 1);
        assert_eq!(advance_streak(Some(day), 3, day + DAY_MS), 4);
        assert_eq!(advance_streak(Some(day), 3, day + 2 * DAY_MS), 1);
        assert_eq!(advance_streak(Some(day), 3, day), 3);
    }

    #[test]
    fn test_streak_negative_diff_unchanged() {
        // Out-of-order insert (backfilled session): preserved as "unchanged".
        let day = local_day_start_ms(1_705_147_200_000);
        assert_eq!(advance_streak(Some(day), 5, day - DAY_MS), 5);
    }

    #[test]
    fn test_update_stats_extends_streak_across_days() {
        // Noon-to-noon 24h apart lands on consecutive local days in any
        // fixed-offset timezone.
        let noon = 1_705_147_200; // 2024-01-13 12:00 UTC
        let mut stats = update_stats(&UserStats::default(), &session(noon, 5_000.0, 1_800));
        assert_eq!(stats.streak_days, 1);

        stats = update_stats(&stats, &session(noon + 86_400, 4_000.0, 1_500));
        assert_eq!(stats.streak_days, 2);

        // Second run the same day leaves the streak alone.
        stats = update_stats(&stats, &session(noon + 86_400 + 3_600, 2_000.0, 700));
        assert_eq!(stats.streak_days, 2);

        // Skipping a day breaks the streak.
        stats = update_stats(&stats, &session(noon + 4 * 86_400, 4_000.0, 1_500));
        assert_eq!(stats.streak_days, 1);
    }

    #[test]
    fn test_last_run_date_is_day_truncated() {
        let noon = 1_705_147_200;
        let stats = update_stats(&UserStats::default(), &session(noon, 5_000.0, 1_800));
        assert_eq!(
            stats.last_run_date_ms,
            Some(local_day_start_ms(noon * 1000))
        );
    }

    #[test]
    fn test_day_start_is_idempotent() {
        let ts = 1_705_147_200_000;
        let day = local_day_start_ms(ts);
        assert_eq!(local_day_start_ms(day), day);
        assert!(day <= ts && ts - day < DAY_MS + 3_600_000);
    }
}
