//! # Reward Engine
//!
//! Tiered achievement evaluation over cumulative statistics.
//!
//! A static catalog defines thresholds in five categories (distance, time,
//! count, speed, streak). [`evaluate`] compares a [`UserStats`] snapshot
//! against the catalog and a set of already-achieved reward ids, returning
//! both the full per-reward progress view and the subset newly crossed.
//!
//! The engine is a pure function: it never mutates persisted state, and
//! calling it twice with the same inputs returns the same result. Callers
//! must persist newly returned rewards into the achieved set before
//! re-evaluating, or the same reward will be reported as new again.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::stats::UserStats;

/// Statistic a reward threshold is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardCategory {
    /// Lifetime distance in meters.
    Distance,
    /// Lifetime running time in seconds.
    Time,
    /// Number of completed runs.
    Count,
    /// Fastest observed speed in km/h.
    Speed,
    /// Consecutive run days.
    Streak,
}

/// One entry of the static reward catalog. Configuration, not user data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardDefinition {
    pub id: String,
    pub category: RewardCategory,
    pub threshold: f64,
    pub title: String,
    /// Ordinal rank within the category; higher tier = harder threshold.
    pub tier: u8,
}

/// Progress of a single reward for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardProgress {
    #[serde(flatten)]
    pub definition: RewardDefinition,
    pub achieved: bool,
    /// Percentage toward the threshold, clamped to 0..=100.
    pub progress: f64,
}

/// Result of one evaluation pass over the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardEvaluation {
    /// Rewards whose thresholds were crossed and are not yet in the
    /// achieved set, in catalog order.
    pub new_rewards: Vec<RewardDefinition>,
    /// Every catalog entry with its achievement state and progress, in
    /// catalog order.
    pub all_rewards: Vec<RewardProgress>,
}

fn def(id: &str, category: RewardCategory, threshold: f64, title: &str, tier: u8) -> RewardDefinition {
    RewardDefinition {
        id: id.to_string(),
        category,
        threshold,
        title: title.to_string(),
        tier,
    }
}

/// The process-wide reward catalog.
///
/// Grouped by category (distance, time, count, speed, streak), ascending
/// tier within each category. Evaluation and output ordering follow
/// declaration order.
pub static REWARD_CATALOG: Lazy<Vec<RewardDefinition>> = Lazy::new(|| {
    use RewardCategory::*;

    vec![
        def("dist_10km", Distance, 10_000.0, "Run 10 km", 1),
        def("dist_50km", Distance, 50_000.0, "Run 50 km", 2),
        def("dist_100km", Distance, 100_000.0, "Run 100 km", 3),
        def("dist_500km", Distance, 500_000.0, "Run 500 km", 4),
        def("time_5h", Time, 5.0 * 3600.0, "Run for 5 hours", 1),
        def("time_10h", Time, 10.0 * 3600.0, "Run for 10 hours", 2),
        def("time_20h", Time, 20.0 * 3600.0, "Run for 20 hours", 3),
        def("time_50h", Time, 50.0 * 3600.0, "Run for 50 hours", 4),
        def("count_5", Count, 5.0, "Complete 5 runs", 1),
        def("count_20", Count, 20.0, "Complete 20 runs", 2),
        def("count_50", Count, 50.0, "Complete 50 runs", 3),
        def("count_100", Count, 100.0, "Complete 100 runs", 4),
        def("speed_12", Speed, 12.0, "Hit 12 km/h", 1),
        def("speed_15", Speed, 15.0, "Hit 15 km/h", 2),
        def("speed_18", Speed, 18.0, "Hit 18 km/h", 3),
        def("streak_3", Streak, 3.0, "3-day streak", 1),
        def("streak_7", Streak, 7.0, "7-day streak", 2),
        def("streak_14", Streak, 14.0, "14-day streak", 3),
        def("streak_30", Streak, 30.0, "30-day streak", 4),
    ]
});

/// Select the stat value a category is measured against.
fn stat_value(category: RewardCategory, stats: &UserStats) -> f64 {
    match category {
        RewardCategory::Distance => stats.total_distance_m,
        RewardCategory::Time => stats.total_time_s as f64,
        RewardCategory::Count => f64::from(stats.total_runs),
        RewardCategory::Speed => stats.max_speed_kmh,
        RewardCategory::Streak => f64::from(stats.streak_days),
    }
}

/// Evaluate the full catalog against cumulative stats.
///
/// `achieved_ids` holds the reward ids already unlocked for this user;
/// entries in it are never reported as new again regardless of how far
/// the stats have grown past their thresholds.
pub fn evaluate(stats: &UserStats, achieved_ids: &HashSet<String>) -> RewardEvaluation {
    let mut new_rewards = Vec::new();
    let mut all_rewards = Vec::with_capacity(REWARD_CATALOG.len());

    for reward in REWARD_CATALOG.iter() {
        let value = stat_value(reward.category, stats);
        let achieved = achieved_ids.contains(&reward.id);
        let progress = ((value / reward.threshold) * 100.0).clamp(0.0, 100.0);

        if !achieved && value >= reward.threshold {
            new_rewards.push(reward.clone());
        }

        all_rewards.push(RewardProgress {
            definition: reward.clone(),
            achieved,
            progress,
        });
    }

    RewardEvaluation {
        new_rewards,
        all_rewards,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn stats_with_distance(total_distance_m: f64) -> UserStats {
        UserStats {
            total_distance_m,
            ..UserStats::default()
        }
    }

    #[test]
    fn test_catalog_ordering() {
        // Categories in declaration order, tiers ascending within each.
        let mut last_category = None;
        let mut last_tier = 0;
        for reward in REWARD_CATALOG.iter() {
            if last_category != Some(reward.category) {
                last_category = Some(reward.category);
                last_tier = 0;
            }
            assert!(reward.tier > last_tier, "tiers out of order at {}", reward.id);
            assert!(reward.threshold > 0.0);
            last_tier = reward.tier;
        }
        assert_eq!(REWARD_CATALOG.len(), 19);
    }

    #[test]
    fn test_progress_below_threshold() {
        // 9km of a 10km threshold: 90%, not achieved.
        let result = evaluate(&stats_with_distance(9_000.0), &HashSet::new());
        let reward = result
            .all_rewards
            .iter()
            .find(|r| r.definition.id == "dist_10km")
            .unwrap();

        assert!(!reward.achieved);
        assert!((reward.progress - 90.0).abs() < 1e-9);
        assert!(result.new_rewards.is_empty());
    }

    #[test]
    fn test_progress_clamps_at_100() {
        let result = evaluate(&stats_with_distance(60_000.0), &HashSet::new());
        let reward = result
            .all_rewards
            .iter()
            .find(|r| r.definition.id == "dist_10km")
            .unwrap();
        assert_eq!(reward.progress, 100.0);
    }

    #[test]
    fn test_new_reward_reported_once_persisted() {
        // Crossing 10km reports dist_10km as new; once the id is in the
        // achieved set it is never reported again.
        let stats = stats_with_distance(12_000.0);

        let first = evaluate(&stats, &HashSet::new());
        assert!(first.new_rewards.iter().any(|r| r.id == "dist_10km"));

        let second = evaluate(&stats, &ids(&["dist_10km"]));
        assert!(second.new_rewards.is_empty());

        // Still absent with even higher values later.
        let third = evaluate(&stats_with_distance(45_000.0), &ids(&["dist_10km"]));
        assert!(third.new_rewards.is_empty());

        let achieved = second
            .all_rewards
            .iter()
            .find(|r| r.definition.id == "dist_10km")
            .unwrap();
        assert!(achieved.achieved);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        // Identical inputs produce identical output.
        let stats = UserStats {
            total_distance_m: 55_000.0,
            total_time_s: 6 * 3600,
            total_runs: 7,
            max_speed_kmh: 13.4,
            last_run_date_ms: None,
            streak_days: 4,
        };
        let achieved = ids(&["dist_10km", "count_5"]);

        let a = evaluate(&stats, &achieved);
        let b = evaluate(&stats, &achieved);

        assert_eq!(
            serde_json::to_string(&a.all_rewards).unwrap(),
            serde_json::to_string(&b.all_rewards).unwrap()
        );
        assert_eq!(a.new_rewards, b.new_rewards);
    }

    #[test]
    fn test_multiple_categories_unlock_together() {
        let stats = UserStats {
            total_distance_m: 10_500.0,
            total_time_s: 5 * 3600,
            total_runs: 5,
            max_speed_kmh: 12.1,
            last_run_date_ms: None,
            streak_days: 3,
        };

        let result = evaluate(&stats, &HashSet::new());
        let new_ids: Vec<&str> = result.new_rewards.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            new_ids,
            vec!["dist_10km", "time_5h", "count_5", "speed_12", "streak_3"]
        );
    }

    #[test]
    fn test_all_rewards_covers_catalog() {
        let result = evaluate(&UserStats::default(), &HashSet::new());
        assert_eq!(result.all_rewards.len(), REWARD_CATALOG.len());
        assert!(result.all_rewards.iter().all(|r| !r.achieved));
        assert!(result.all_rewards.iter().all(|r| r.progress == 0.0));
    }
}
