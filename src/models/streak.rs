//! Streak ledger row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Freeze tokens granted to a new streak record (also the cap).
pub const MAX_FREEZE_TOKENS: u8 = 3;

/// Consecutive-day activity counter, one per user.
///
/// Invariants: `current_streak <= longest_streak` and
/// `freeze_tokens_remaining <= MAX_FREEZE_TOKENS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub owner_id: String,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    #[serde(default)]
    pub last_qualifying_date: Option<NaiveDate>,
    #[serde(default = "default_freeze_tokens")]
    pub freeze_tokens_remaining: u8,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_freeze_tokens() -> u8 {
    MAX_FREEZE_TOKENS
}

impl StreakRecord {
    /// Empty record for a user who has never qualified.
    pub fn new(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            current_streak: 0,
            longest_streak: 0,
            last_qualifying_date: None,
            freeze_tokens_remaining: MAX_FREEZE_TOKENS,
            updated_at: None,
        }
    }
}
