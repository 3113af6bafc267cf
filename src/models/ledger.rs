//! Per-owner ledger aggregates, persisted runs and finish receipts.
//!
//! These rows are written together in one atomic commit when a session
//! finishes; see `LedgerStore::apply_finish`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AchievementProgress, DailyProgress, StreakRecord};

/// Lifetime totals for a user.
///
/// Stored at: `lifetime_stats/{owner_id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifetimeStats {
    #[serde(default)]
    pub total_sessions: u32,
    #[serde(default)]
    pub total_distance_meters: f64,
    #[serde(default)]
    pub total_active_seconds: u64,
    #[serde(default)]
    pub total_gems: u64,
    #[serde(default)]
    pub flagged_sessions: u32,

    /// Last update timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: String,
}

impl LifetimeStats {
    /// Fold a completed run into the totals.
    ///
    /// Not idempotent on its own: callers rely on the stored
    /// `FinishReceipt` to apply each session once.
    pub fn record_run(&mut self, run: &RunRecord, now: &str) {
        self.updated_at = now.to_string();

        self.total_sessions += 1;
        self.total_distance_meters += run.distance_meters;
        self.total_active_seconds += run.elapsed_seconds;
        self.total_gems += u64::from(run.gems_earned);
        if run.is_flagged {
            self.flagged_sessions += 1;
        }
    }
}

/// A completed, validated session as persisted.
///
/// Stored at: `runs/{session_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub session_id: String,
    pub owner_id: String,
    /// Calendar date the run is credited to
    pub activity_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
    /// Distance reported by the client; credited to the ledgers
    pub distance_meters: f64,
    /// Distance accepted by the server-side sample filter
    #[serde(default)]
    pub tracked_distance_meters: f64,
    pub average_pace_min_per_km: f64,
    pub peak_speed_mps: f64,
    pub calories_estimate: u32,
    pub gems_earned: u32,
    /// Marked for audit by anti-cheat; still rewarded
    pub is_flagged: bool,
    /// Route as a precision-5 encoded polyline
    #[serde(default)]
    pub route_polyline: Option<String>,
    #[serde(default)]
    pub route_points: u32,
}

/// The externally visible result of finishing a session.
///
/// Stored at: `finish_receipts/{session_id}` so replays return it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishReceipt {
    pub session_id: String,
    pub owner_id: String,
    pub streak: StreakRecord,
    pub daily_progress: DailyProgress,
    /// Titles of achievements unlocked by this session
    pub unlocked_achievements: Vec<String>,
    pub gems_earned: u32,
    pub is_flagged: bool,
    #[serde(default)]
    pub freeze_token_consumed: bool,
    pub completed_at: DateTime<Utc>,
}

/// External friend-list count, maintained outside this service.
///
/// Stored at: `social_connections/{owner_id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialConnections {
    #[serde(default)]
    pub count: u32,
}

/// Everything the finish computation reads, loaded in one consistent view.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub streak: Option<StreakRecord>,
    pub daily: Option<DailyProgress>,
    pub achievements: Vec<AchievementProgress>,
    pub lifetime: LifetimeStats,
    pub social_connections: u32,
}

/// Every row the finish computation writes.
#[derive(Debug, Clone)]
pub struct LedgerUpdate {
    pub streak: StreakRecord,
    pub daily: DailyProgress,
    /// Full set of the owner's achievement rows after evaluation
    pub achievements: Vec<AchievementProgress>,
    pub lifetime: LifetimeStats,
    pub run: RunRecord,
    pub receipt: FinishReceipt,
}

/// Result of `apply_finish`.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// First successful apply for this session id
    Applied(FinishReceipt),
    /// Session id was already applied; the stored receipt is returned
    Duplicate(FinishReceipt),
}

impl ApplyOutcome {
    pub fn receipt(&self) -> &FinishReceipt {
        match self {
            ApplyOutcome::Applied(r) | ApplyOutcome::Duplicate(r) => r,
        }
    }

    pub fn into_receipt(self) -> FinishReceipt {
        match self {
            ApplyOutcome::Applied(r) | ApplyOutcome::Duplicate(r) => r,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_run(id: &str, distance: f64, seconds: u64, flagged: bool) -> RunRecord {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        RunRecord {
            session_id: id.to_string(),
            owner_id: "u1".to_string(),
            activity_date: start.date_naive(),
            started_at: start,
            ended_at: start + chrono::Duration::seconds(seconds as i64),
            elapsed_seconds: seconds,
            distance_meters: distance,
            tracked_distance_meters: distance,
            average_pace_min_per_km: 6.0,
            peak_speed_mps: 3.5,
            calories_estimate: 100,
            gems_earned: (distance / 1000.0).floor() as u32,
            is_flagged: flagged,
            route_polyline: None,
            route_points: 0,
        }
    }

    #[test]
    fn test_record_run_basic() {
        let mut stats = LifetimeStats::default();
        stats.record_run(&make_run("s1", 5200.0, 1800, false), "now");

        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.total_distance_meters, 5200.0);
        assert_eq!(stats.total_active_seconds, 1800);
        assert_eq!(stats.total_gems, 5);
        assert_eq!(stats.flagged_sessions, 0);
    }

    #[test]
    fn test_record_run_accumulates() {
        let mut stats = LifetimeStats::default();
        stats.record_run(&make_run("s1", 3000.0, 900, true), "t1");
        stats.record_run(&make_run("s2", 2000.0, 600, false), "t2");

        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_distance_meters, 5000.0);
        assert_eq!(stats.total_active_seconds, 1500);
        assert_eq!(stats.flagged_sessions, 1);
        assert_eq!(stats.updated_at, "t2");
    }
}
