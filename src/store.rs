//! # Session Store
//!
//! Persistence contract for sessions, routes, stats and reward records,
//! plus the local SQLite implementation.
//!
//! The engine only ever talks to [`SessionStore`]; which implementations
//! are injected (local SQLite, a cloud mirror speaking the same contract)
//! is the embedding application's choice. The core never branches on
//! platform.
//!
//! ## Identity
//!
//! A `user_id` of `None` is the guest profile. Guest session rows keep a
//! NULL `user_id` (the guest→account merge scans for them); guest stats
//! and reward rows are keyed under the synthetic `"guest"` identifier so
//! they can live in keyed tables.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stats::UserStats;
use crate::{GeoPoint, RunningSession, SessionType};

/// Synthetic stats/rewards key for the unauthenticated local profile.
pub const GUEST_KEY: &str = "guest";

/// Aggregates for a single period (today's runs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub runs: u32,
    pub distance_m: f64,
    pub duration_s: u64,
    pub avg_pace_s_per_km: Option<f64>,
}

/// Per-day aggregates for the weekly view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    /// Calendar day in `YYYY-MM-DD` form.
    pub date: String,
    pub runs: u32,
    pub distance_m: f64,
    pub duration_s: u64,
}

/// Narrow save/query contract the engine consumes.
///
/// `load_stats` and `load_achieved_reward_ids` return zeroed/empty values
/// when nothing is stored yet; "not found" is never an error.
/// `save_reward_record` is idempotent: re-saving an existing
/// (user, reward) pair is a no-op.
pub trait SessionStore {
    /// Persist a finalized session together with its route points.
    /// Returns the session id.
    fn save_session(&mut self, session: &RunningSession, route: &[GeoPoint]) -> Result<String>;

    /// Load sessions for a user (most recent first). `None` selects guest
    /// sessions.
    fn load_sessions(&self, user_id: Option<&str>, limit: u32) -> Result<Vec<RunningSession>>;

    /// Load the stored route of a session, ordered by timestamp.
    fn load_route(&self, session_id: &str) -> Result<Vec<GeoPoint>>;

    /// Re-assign a session to another owner (guest→account merge).
    fn reassign_session(&mut self, session_id: &str, user_id: &str) -> Result<()>;

    fn load_stats(&self, user_id: Option<&str>) -> Result<UserStats>;

    fn save_stats(&mut self, user_id: Option<&str>, stats: &UserStats) -> Result<()>;

    fn load_achieved_reward_ids(&self, user_id: Option<&str>) -> Result<HashSet<String>>;

    fn save_reward_record(
        &mut self,
        user_id: Option<&str>,
        reward_id: &str,
        achieved_at_ms: i64,
    ) -> Result<()>;
}

/// Map the nullable user identifier to the keyed-table key.
fn user_key(user_id: Option<&str>) -> &str {
    user_id.unwrap_or(GUEST_KEY)
}

// ============================================================================
// SQLite implementation
// ============================================================================

/// Local SQLite-backed session store.
pub struct SqliteStore {
    db: Connection,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path.
    pub fn open(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            -- Finalized run sessions (immutable after creation, except for
            -- the guest→account owner re-assignment)
            CREATE TABLE IF NOT EXISTS running_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                type TEXT NOT NULL DEFAULT 'solo',
                distance REAL NOT NULL DEFAULT 0,
                duration INTEGER NOT NULL DEFAULT 0,
                avg_pace REAL,
                max_speed REAL,
                calories INTEGER,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );

            -- Route fixes, cascade-deleted with their session
            CREATE TABLE IF NOT EXISTS route_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                timestamp INTEGER NOT NULL,
                FOREIGN KEY (session_id) REFERENCES running_sessions(id) ON DELETE CASCADE
            );

            -- Lifetime accumulator, one row per user key
            CREATE TABLE IF NOT EXISTS user_stats (
                user_id TEXT PRIMARY KEY,
                total_distance REAL NOT NULL DEFAULT 0,
                total_time INTEGER NOT NULL DEFAULT 0,
                total_runs INTEGER NOT NULL DEFAULT 0,
                max_speed REAL NOT NULL DEFAULT 0,
                last_run_date INTEGER,
                streak_days INTEGER NOT NULL DEFAULT 0
            );

            -- Unlocked rewards, write-once per (user, reward)
            CREATE TABLE IF NOT EXISTS user_rewards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                reward_id TEXT NOT NULL,
                achieved_at INTEGER NOT NULL,
                UNIQUE(user_id, reward_id)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON running_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_start ON running_sessions(start_time);
            CREATE INDEX IF NOT EXISTS idx_route_session ON route_points(session_id);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;
        "#,
        )
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunningSession> {
        let session_type: String = row.get("type")?;
        Ok(RunningSession {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            session_type: SessionType::from_str_or_solo(&session_type),
            distance_m: row.get("distance")?,
            duration_s: row.get("duration")?,
            avg_pace_s_per_km: row.get("avg_pace")?,
            max_speed_kmh: row.get("max_speed")?,
            calories: row.get("calories")?,
            start_time_s: row.get("start_time")?,
            end_time_s: row.get("end_time")?,
        })
    }

    // ========================================================================
    // Period queries
    // ========================================================================

    /// Aggregates for sessions starting at or after `day_start_s`.
    pub fn today_stats(&self, user_id: Option<&str>, day_start_s: i64) -> Result<PeriodStats> {
        let sql = match user_id {
            Some(_) => {
                "SELECT COUNT(*), COALESCE(SUM(distance), 0), COALESCE(SUM(duration), 0), AVG(avg_pace)
                 FROM running_sessions WHERE user_id = ?1 AND start_time >= ?2"
            }
            None => {
                "SELECT COUNT(*), COALESCE(SUM(distance), 0), COALESCE(SUM(duration), 0), AVG(avg_pace)
                 FROM running_sessions WHERE user_id IS NULL AND start_time >= ?1"
            }
        };

        let map = |row: &rusqlite::Row<'_>| {
            Ok(PeriodStats {
                runs: row.get(0)?,
                distance_m: row.get(1)?,
                duration_s: row.get(2)?,
                avg_pace_s_per_km: row.get(3)?,
            })
        };

        let stats = match user_id {
            Some(uid) => self.db.query_row(sql, params![uid, day_start_s], map)?,
            None => self.db.query_row(sql, params![day_start_s], map)?,
        };
        Ok(stats)
    }

    /// Per-day aggregates for sessions starting at or after `week_start_s`,
    /// oldest day first.
    pub fn weekly_stats(&self, user_id: Option<&str>, week_start_s: i64) -> Result<Vec<DailySummary>> {
        let sql = match user_id {
            Some(_) => {
                "SELECT date(start_time, 'unixepoch') AS day, COUNT(*), SUM(distance), SUM(duration)
                 FROM running_sessions WHERE user_id = ?1 AND start_time >= ?2
                 GROUP BY day ORDER BY day ASC"
            }
            None => {
                "SELECT date(start_time, 'unixepoch') AS day, COUNT(*), SUM(distance), SUM(duration)
                 FROM running_sessions WHERE user_id IS NULL AND start_time >= ?1
                 GROUP BY day ORDER BY day ASC"
            }
        };

        let map = |row: &rusqlite::Row<'_>| {
            Ok(DailySummary {
                date: row.get(0)?,
                runs: row.get(1)?,
                distance_m: row.get(2)?,
                duration_s: row.get(3)?,
            })
        };

        let mut stmt = self.db.prepare(sql)?;
        let rows = match user_id {
            Some(uid) => stmt.query_map(params![uid, week_start_s], map)?,
            None => stmt.query_map(params![week_start_s], map)?,
        };

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }
}

impl SessionStore for SqliteStore {
    fn save_session(&mut self, session: &RunningSession, route: &[GeoPoint]) -> Result<String> {
        let tx = self.db.transaction()?;

        tx.execute(
            "INSERT INTO running_sessions
               (id, user_id, type, distance, duration, avg_pace, max_speed, calories, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.id,
                session.user_id,
                session.session_type.as_str(),
                session.distance_m,
                session.duration_s,
                session.avg_pace_s_per_km,
                session.max_speed_kmh,
                session.calories,
                session.start_time_s,
                session.end_time_s,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO route_points (session_id, lat, lng, timestamp) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for point in route {
                stmt.execute(params![session.id, point.lat, point.lng, point.timestamp_ms])?;
            }
        }

        tx.commit()?;
        Ok(session.id.clone())
    }

    fn load_sessions(&self, user_id: Option<&str>, limit: u32) -> Result<Vec<RunningSession>> {
        let sql = match user_id {
            Some(_) => {
                "SELECT * FROM running_sessions WHERE user_id = ?1 ORDER BY start_time DESC LIMIT ?2"
            }
            None => {
                "SELECT * FROM running_sessions WHERE user_id IS NULL ORDER BY start_time DESC LIMIT ?1"
            }
        };

        let mut stmt = self.db.prepare(sql)?;
        let rows = match user_id {
            Some(uid) => stmt.query_map(params![uid, limit], Self::row_to_session)?,
            None => stmt.query_map(params![limit], Self::row_to_session)?,
        };

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    fn load_route(&self, session_id: &str) -> Result<Vec<GeoPoint>> {
        let mut stmt = self.db.prepare(
            "SELECT lat, lng, timestamp FROM route_points
             WHERE session_id = ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(GeoPoint::new(row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        let mut route = Vec::new();
        for row in rows {
            route.push(row?);
        }
        Ok(route)
    }

    fn reassign_session(&mut self, session_id: &str, user_id: &str) -> Result<()> {
        self.db.execute(
            "UPDATE running_sessions SET user_id = ?1 WHERE id = ?2",
            params![user_id, session_id],
        )?;
        Ok(())
    }

    fn load_stats(&self, user_id: Option<&str>) -> Result<UserStats> {
        let stats = self
            .db
            .query_row(
                "SELECT total_distance, total_time, total_runs, max_speed, last_run_date, streak_days
                 FROM user_stats WHERE user_id = ?1",
                params![user_key(user_id)],
                |row| {
                    Ok(UserStats {
                        total_distance_m: row.get(0)?,
                        total_time_s: row.get(1)?,
                        total_runs: row.get(2)?,
                        max_speed_kmh: row.get(3)?,
                        last_run_date_ms: row.get(4)?,
                        streak_days: row.get(5)?,
                    })
                },
            )
            .optional()?;

        Ok(stats.unwrap_or_default())
    }

    fn save_stats(&mut self, user_id: Option<&str>, stats: &UserStats) -> Result<()> {
        self.db.execute(
            "INSERT INTO user_stats
               (user_id, total_distance, total_time, total_runs, max_speed, last_run_date, streak_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
               total_distance = excluded.total_distance,
               total_time = excluded.total_time,
               total_runs = excluded.total_runs,
               max_speed = excluded.max_speed,
               last_run_date = excluded.last_run_date,
               streak_days = excluded.streak_days",
            params![
                user_key(user_id),
                stats.total_distance_m,
                stats.total_time_s,
                stats.total_runs,
                stats.max_speed_kmh,
                stats.last_run_date_ms,
                stats.streak_days,
            ],
        )?;
        Ok(())
    }

    fn load_achieved_reward_ids(&self, user_id: Option<&str>) -> Result<HashSet<String>> {
        let mut stmt = self
            .db
            .prepare("SELECT reward_id FROM user_rewards WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_key(user_id)], |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    fn save_reward_record(
        &mut self,
        user_id: Option<&str>,
        reward_id: &str,
        achieved_at_ms: i64,
    ) -> Result<()> {
        self.db.execute(
            "INSERT OR IGNORE INTO user_rewards (user_id, reward_id, achieved_at)
             VALUES (?1, ?2, ?3)",
            params![user_key(user_id), reward_id, achieved_at_ms],
        )?;
        Ok(())
    }
}
