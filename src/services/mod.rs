// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod accumulator;
pub mod achievements;
pub mod anti_cheat;
pub mod daily_goal;
pub mod filter;
pub mod finish;
pub mod registry;
pub mod session;
pub mod streak;

pub use accumulator::DistanceAccumulator;
pub use achievements::{AchievementEngine, AchievementFacts, CategoryGroup};
pub use anti_cheat::{AntiCheatValidator, AntiCheatVerdict};
pub use daily_goal::DailyGoalTracker;
pub use filter::{FilterDecision, GeoSampleFilter, RejectReason};
pub use finish::SessionFinisher;
pub use registry::{SessionHandle, SessionRegistry};
pub use session::{FinishReport, RunSessionMachine, SessionSnapshot};
pub use streak::{FreezePolicy, StreakEngine, StreakOutcome};
