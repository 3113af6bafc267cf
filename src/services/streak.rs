// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Consecutive-day streak evaluation.

use crate::models::StreakRecord;
use crate::time_utils::days_between;
use chrono::{DateTime, NaiveDate, Utc};
use std::str::FromStr;

/// Whether freeze tokens may bridge a missed day.
///
/// `BridgeSingleDay` spends one token when exactly one calendar day was
/// missed, continuing the streak instead of resetting it. The default
/// keeps tokens out of the gap logic entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FreezePolicy {
    #[default]
    Disabled,
    BridgeSingleDay,
}

impl FromStr for FreezePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(Self::Disabled),
            "bridge_single_day" => Ok(Self::BridgeSingleDay),
            other => Err(format!("unknown freeze policy: {}", other)),
        }
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct StreakOutcome {
    pub record: StreakRecord,
    /// `true` when today was newly counted
    pub counted_today: bool,
    pub freeze_token_consumed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreakEngine {
    policy: FreezePolicy,
}

impl StreakEngine {
    pub fn new(policy: FreezePolicy) -> Self {
        Self { policy }
    }

    /// Evaluate `today` for one owner.
    ///
    /// Idempotent per day: once today is counted, further calls change
    /// nothing. A day whose goal is not met changes nothing either; the gap
    /// is only noticed on the next qualifying day.
    pub fn evaluate(
        &self,
        owner_id: &str,
        existing: Option<StreakRecord>,
        today: NaiveDate,
        goal_met: bool,
        now: DateTime<Utc>,
    ) -> StreakOutcome {
        let mut record = existing.unwrap_or_else(|| StreakRecord::new(owner_id));
        let unchanged = |record: StreakRecord| StreakOutcome {
            record,
            counted_today: false,
            freeze_token_consumed: false,
        };

        if !goal_met {
            return unchanged(record);
        }

        let mut freeze_token_consumed = false;
        match record.last_qualifying_date {
            None => record.current_streak = 1,
            Some(last) => match days_between(last, today) {
                1 => record.current_streak += 1,
                0 => return unchanged(record),
                days if days < 0 => {
                    tracing::debug!(
                        owner_id,
                        %today,
                        %last,
                        "Session dated before last qualifying day, streak untouched"
                    );
                    return unchanged(record);
                }
                2 if self.policy == FreezePolicy::BridgeSingleDay
                    && record.freeze_tokens_remaining > 0 =>
                {
                    record.freeze_tokens_remaining -= 1;
                    record.current_streak += 1;
                    freeze_token_consumed = true;
                }
                _ => record.current_streak = 1,
            },
        }

        record.longest_streak = record.longest_streak.max(record.current_streak);
        record.last_qualifying_date = Some(today);
        record.updated_at = Some(now);

        tracing::debug!(
            owner_id,
            %today,
            current = record.current_streak,
            longest = record.longest_streak,
            freeze_token_consumed,
            "Streak counted"
        );

        StreakOutcome {
            record,
            counted_today: true,
            freeze_token_consumed,
        }
    }
}
