//! Ledger persistence.
//!
//! `LedgerStore` is the seam between the finish computation and storage.
//! `MemoryDb` backs local development and tests; `FirestoreDb` backs
//! production.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::Result;
use crate::models::{
    AchievementProgress, ApplyOutcome, DailyProgress, FinishReceipt, LedgerSnapshot,
    LedgerUpdate, LifetimeStats, RunRecord, StreakRecord,
};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Collection names as constants.
pub mod collections {
    /// Keyed by owner_id
    pub const STREAKS: &str = "streaks";
    /// Keyed by `{owner_id}_{YYYY-MM-DD}`
    pub const DAILY_PROGRESS: &str = "daily_progress";
    /// Keyed by `{owner_id}_{achievement_id}`
    pub const ACHIEVEMENT_PROGRESS: &str = "achievement_progress";
    /// Keyed by owner_id
    pub const LIFETIME_STATS: &str = "lifetime_stats";
    /// Keyed by session_id
    pub const RUNS: &str = "runs";
    /// Keyed by session_id
    pub const FINISH_RECEIPTS: &str = "finish_receipts";
    /// Keyed by owner_id; written by the social service
    pub const SOCIAL_CONNECTIONS: &str = "social_connections";
}

/// Pure computation from the loaded ledger to the rows to write.
pub type ComputeUpdate<'a> = dyn Fn(LedgerSnapshot) -> LedgerUpdate + Send + Sync + 'a;

/// Storage for the per-owner gamification ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Atomically apply a finished session.
    ///
    /// Loads the owner's ledger for `date`, and unless `session_id` was
    /// already applied, runs `compute` and writes every row it returns in a
    /// single commit. Either all rows are written or none are. A replay
    /// returns `ApplyOutcome::Duplicate` with the stored receipt.
    async fn apply_finish(
        &self,
        owner_id: &str,
        session_id: &str,
        date: NaiveDate,
        compute: &ComputeUpdate<'_>,
    ) -> Result<ApplyOutcome>;

    async fn get_receipt(&self, session_id: &str) -> Result<Option<FinishReceipt>>;

    async fn get_streak(&self, owner_id: &str) -> Result<Option<StreakRecord>>;

    async fn get_daily_progress(
        &self,
        owner_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyProgress>>;

    async fn get_achievements(&self, owner_id: &str) -> Result<Vec<AchievementProgress>>;

    /// Store freshly created achievement rows. Existing rows are untouched.
    async fn init_achievements(&self, owner_id: &str, rows: &[AchievementProgress]) -> Result<()>;

    async fn get_lifetime_stats(&self, owner_id: &str) -> Result<Option<LifetimeStats>>;

    async fn get_run(&self, session_id: &str) -> Result<Option<RunRecord>>;
}
