// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Achievement catalog descriptors and per-user progress rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grouping used when presenting the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Distance,
    Speed,
    Consistency,
    Frequency,
    Social,
}

impl AchievementCategory {
    pub const ALL: [AchievementCategory; 5] = [
        AchievementCategory::Distance,
        AchievementCategory::Speed,
        AchievementCategory::Consistency,
        AchievementCategory::Frequency,
        AchievementCategory::Social,
    ];
}

/// Rule shape evaluated against a definition's `target_value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateKind {
    /// Single-session distance in meters reaches the target
    SessionDistance,
    /// Cumulative lifetime distance in meters reaches the target
    LifetimeDistance,
    /// Session average pace (min/km) at or below the target, over a minimum distance
    PaceAtMost { min_distance_meters: f64 },
    /// Current streak in days reaches the target
    StreakDays,
    /// Lifetime completed sessions reach the target
    SessionCount,
    /// Social connections reach the target
    SocialCount,
}

/// Static catalog entry. Never mutated at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AchievementDefinition {
    pub achievement_id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub category: AchievementCategory,
    pub target_value: f64,
    pub predicate: PredicateKind,
}

/// Per-user progress toward one catalog entry.
///
/// Unlocking is monotonic: once `is_unlocked` is set no method clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementProgress {
    pub owner_id: String,
    pub achievement_id: String,
    #[serde(default)]
    pub current_value: f64,
    #[serde(default)]
    pub progress_ratio: f64,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl AchievementProgress {
    pub fn new(owner_id: &str, achievement_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            achievement_id: achievement_id.to_string(),
            current_value: 0.0,
            progress_ratio: 0.0,
            is_unlocked: false,
            unlocked_at: None,
        }
    }

    /// Document key: one row per (owner, achievement).
    pub fn doc_id(owner_id: &str, achievement_id: &str) -> String {
        format!("{}_{}", owner_id, achievement_id)
    }

    /// Record partial progress. Ignored once unlocked.
    pub fn record_progress(&mut self, current_value: f64, ratio: f64) {
        if self.is_unlocked {
            return;
        }
        self.current_value = current_value;
        self.progress_ratio = clamp_ratio(ratio);
    }

    /// Mark unlocked at `now`. Returns `false` if it already was.
    pub fn unlock(&mut self, current_value: f64, now: DateTime<Utc>) -> bool {
        if self.is_unlocked {
            return false;
        }
        self.current_value = current_value;
        self.progress_ratio = 1.0;
        self.is_unlocked = true;
        self.unlocked_at = Some(now);
        true
    }
}

/// Clamp into `[0, 1]`, mapping NaN to 0.
pub fn clamp_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(0.0, 1.0)
    }
}
