// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily active-time goal accumulation.

use crate::models::DailyProgress;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy)]
pub struct DailyGoalTracker {
    default_minutes_goal: u32,
}

impl DailyGoalTracker {
    pub fn new(default_minutes_goal: u32) -> Self {
        Self {
            default_minutes_goal,
        }
    }

    /// Credit a session to the day's row, creating it on first use.
    ///
    /// Seconds past the goal are kept; the row holds the exact total of
    /// every credited session.
    pub fn accumulate(
        &self,
        owner_id: &str,
        date: NaiveDate,
        existing: Option<DailyProgress>,
        session_seconds: u64,
        session_gems: u32,
    ) -> DailyProgress {
        let mut progress = existing
            .filter(|p| p.date == date)
            .unwrap_or_else(|| DailyProgress::new(owner_id, date, self.default_minutes_goal));

        progress.seconds_completed = progress.seconds_completed.saturating_add(session_seconds);
        progress.gems_earned_today = progress.gems_earned_today.saturating_add(session_gems);

        tracing::debug!(
            owner_id,
            %date,
            seconds_completed = progress.seconds_completed,
            goal_seconds = progress.goal_seconds(),
            "Daily progress updated"
        );

        progress
    }

    /// Row to show for a day with no activity yet. Not persisted.
    pub fn empty_day(&self, owner_id: &str, date: NaiveDate) -> DailyProgress {
        DailyProgress::new(owner_id, date, self.default_minutes_goal)
    }
}
