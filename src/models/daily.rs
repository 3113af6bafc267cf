//! Daily goal progress row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Active time accumulated by one user on one calendar date.
///
/// `seconds_completed` is never clamped to the goal: it is the exact sum
/// of every credited session that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyProgress {
    pub owner_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub seconds_completed: u64,
    pub minutes_goal: u32,
    #[serde(default)]
    pub gems_earned_today: u32,
}

impl DailyProgress {
    pub fn new(owner_id: &str, date: NaiveDate, minutes_goal: u32) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            date,
            seconds_completed: 0,
            minutes_goal,
            gems_earned_today: 0,
        }
    }

    /// Document key: one row per (owner, date).
    pub fn doc_id(owner_id: &str, date: NaiveDate) -> String {
        format!("{}_{}", owner_id, date.format("%Y-%m-%d"))
    }

    pub fn goal_seconds(&self) -> u64 {
        u64::from(self.minutes_goal) * 60
    }

    pub fn goal_met(&self) -> bool {
        self.seconds_completed >= self.goal_seconds()
    }

    /// Fraction of the goal completed, capped at 1.0.
    pub fn progress_ratio(&self) -> f64 {
        let goal = self.goal_seconds();
        if goal == 0 {
            return 1.0;
        }
        (self.seconds_completed as f64 / goal as f64).min(1.0)
    }
}
