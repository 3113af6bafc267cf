// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod achievement;
pub mod daily;
pub mod geo_sample;
pub mod ledger;
pub mod session;
pub mod streak;

pub use achievement::{
    AchievementCategory, AchievementDefinition, AchievementProgress, PredicateKind,
};
pub use daily::DailyProgress;
pub use geo_sample::GeoSample;
pub use ledger::{
    ApplyOutcome, FinishReceipt, LedgerSnapshot, LedgerUpdate, LifetimeStats, RunRecord,
    SocialConnections,
};
pub use session::{DistanceUnit, RunSession, SessionState};
pub use streak::{StreakRecord, MAX_FREEZE_TOKENS};
