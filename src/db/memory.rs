// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process ledger store.
//!
//! Writes for one owner are serialized by a per-owner async lock, and every
//! row of a finish is staged before any is published, so a failure at any
//! step leaves the ledger untouched.

use crate::db::{ComputeUpdate, LedgerStore};
use crate::error::{AppError, LedgerStep, Result};
use crate::models::{
    AchievementProgress, ApplyOutcome, DailyProgress, FinishReceipt, LedgerSnapshot,
    LifetimeStats, RunRecord, StreakRecord,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type OwnerLocks = DashMap<String, Arc<tokio::sync::Mutex<()>>>;

#[derive(Default)]
pub struct MemoryDb {
    streaks: DashMap<String, StreakRecord>,
    daily: DashMap<String, DailyProgress>,
    achievements: DashMap<String, AchievementProgress>,
    lifetime: DashMap<String, LifetimeStats>,
    runs: DashMap<String, RunRecord>,
    receipts: DashMap<String, FinishReceipt>,
    social: DashMap<String, u32>,
    owner_locks: OwnerLocks,
    fail_next: Mutex<Option<LedgerStep>>,
    commits: AtomicUsize,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `apply_finish` fail at `step`. One-shot.
    pub fn fail_on(&self, step: LedgerStep) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(step);
        }
    }

    /// Stand-in for the external social service.
    pub fn set_social_connections(&self, owner_id: &str, count: u32) {
        self.social.insert(owner_id.to_string(), count);
    }

    /// Number of successful finish commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn check_step(&self, step: LedgerStep) -> Result<()> {
        let mut slot = self
            .fail_next
            .lock()
            .map_err(|_| AppError::persistence(step, "failure injection lock poisoned"))?;
        if *slot == Some(step) {
            *slot = None;
            return Err(AppError::persistence(step, "injected failure"));
        }
        Ok(())
    }

    /// Number of owners with a finish in flight.
    pub fn locked_owner_count(&self) -> usize {
        self.owner_locks.len()
    }

    /// Body of `apply_finish`; the caller holds the owner lock.
    fn apply_locked(
        &self,
        owner_id: &str,
        session_id: &str,
        date: NaiveDate,
        compute: &ComputeUpdate<'_>,
    ) -> Result<ApplyOutcome> {
        self.check_step(LedgerStep::LoadLedger)?;

        if let Some(receipt) = self.receipts.get(session_id).map(|r| r.clone()) {
            if receipt.owner_id != owner_id {
                return Err(AppError::NotFound(format!("Session {}", session_id)));
            }
            tracing::debug!(
                owner_id,
                session_id,
                "Session already applied (idempotent skip)"
            );
            return Ok(ApplyOutcome::Duplicate(receipt));
        }

        let update = compute(self.load(owner_id, date));

        // Stage every row; nothing is visible until the commit below.
        self.check_step(LedgerStep::StreakUpdate)?;
        self.check_step(LedgerStep::DailyGoalUpdate)?;
        self.check_step(LedgerStep::AchievementUpdate)?;
        self.check_step(LedgerStep::RunRecord)?;
        self.check_step(LedgerStep::Commit)?;

        self.streaks.insert(owner_id.to_string(), update.streak);
        self.daily.insert(
            DailyProgress::doc_id(owner_id, update.daily.date),
            update.daily,
        );
        for row in update.achievements {
            self.achievements.insert(
                AchievementProgress::doc_id(owner_id, &row.achievement_id),
                row,
            );
        }
        self.lifetime.insert(owner_id.to_string(), update.lifetime);
        self.runs.insert(session_id.to_string(), update.run);
        self.receipts
            .insert(session_id.to_string(), update.receipt.clone());
        self.commits.fetch_add(1, Ordering::SeqCst);

        tracing::info!(owner_id, session_id, %date, "Session applied to ledger");

        Ok(ApplyOutcome::Applied(update.receipt))
    }

    fn load(&self, owner_id: &str, date: NaiveDate) -> LedgerSnapshot {
        LedgerSnapshot {
            streak: self.streaks.get(owner_id).map(|r| r.clone()),
            daily: self
                .daily
                .get(&DailyProgress::doc_id(owner_id, date))
                .map(|r| r.clone()),
            achievements: self
                .achievements
                .iter()
                .filter(|e| e.owner_id == owner_id)
                .map(|e| e.value().clone())
                .collect(),
            lifetime: self
                .lifetime
                .get(owner_id)
                .map(|r| r.clone())
                .unwrap_or_default(),
            social_connections: self.social.get(owner_id).map(|c| *c).unwrap_or(0),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryDb {
    async fn apply_finish(
        &self,
        owner_id: &str,
        session_id: &str,
        date: NaiveDate,
        compute: &ComputeUpdate<'_>,
    ) -> Result<ApplyOutcome> {
        let lock = self
            .owner_locks
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let guard = lock.lock().await;
        let result = self.apply_locked(owner_id, session_id, date, compute);
        drop(guard);
        drop(lock);

        // Only the map holds the lock once no finish for this owner is in flight.
        self.owner_locks
            .remove_if(owner_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn get_receipt(&self, session_id: &str) -> Result<Option<FinishReceipt>> {
        Ok(self.receipts.get(session_id).map(|r| r.clone()))
    }

    async fn get_streak(&self, owner_id: &str) -> Result<Option<StreakRecord>> {
        Ok(self.streaks.get(owner_id).map(|r| r.clone()))
    }

    async fn get_daily_progress(
        &self,
        owner_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyProgress>> {
        Ok(self
            .daily
            .get(&DailyProgress::doc_id(owner_id, date))
            .map(|r| r.clone()))
    }

    async fn get_achievements(&self, owner_id: &str) -> Result<Vec<AchievementProgress>> {
        Ok(self.load(owner_id, NaiveDate::MIN).achievements)
    }

    async fn init_achievements(&self, owner_id: &str, rows: &[AchievementProgress]) -> Result<()> {
        for row in rows {
            self.achievements
                .entry(AchievementProgress::doc_id(owner_id, &row.achievement_id))
                .or_insert_with(|| row.clone());
        }
        Ok(())
    }

    async fn get_lifetime_stats(&self, owner_id: &str) -> Result<Option<LifetimeStats>> {
        Ok(self.lifetime.get(owner_id).map(|r| r.clone()))
    }

    async fn get_run(&self, session_id: &str) -> Result<Option<RunRecord>> {
        Ok(self.runs.get(session_id).map(|r| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LedgerUpdate;
    use chrono::{TimeZone, Utc};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn compute(snapshot: LedgerSnapshot) -> LedgerUpdate {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        let mut daily = snapshot
            .daily
            .unwrap_or_else(|| DailyProgress::new("u1", day(), 15));
        daily.seconds_completed += 600;
        let mut streak = snapshot.streak.unwrap_or_else(|| StreakRecord::new("u1"));
        streak.current_streak += 1;
        let run = RunRecord {
            session_id: "s1".into(),
            owner_id: "u1".into(),
            activity_date: day(),
            started_at: now,
            ended_at: now,
            elapsed_seconds: 600,
            distance_meters: 1000.0,
            tracked_distance_meters: 990.0,
            average_pace_min_per_km: 10.0,
            peak_speed_mps: 2.0,
            calories_estimate: 60,
            gems_earned: 1,
            is_flagged: false,
            route_polyline: None,
            route_points: 0,
        };
        let mut lifetime = snapshot.lifetime;
        lifetime.record_run(&run, "now");
        let receipt = FinishReceipt {
            session_id: "s1".into(),
            owner_id: "u1".into(),
            streak: streak.clone(),
            daily_progress: daily.clone(),
            unlocked_achievements: vec![],
            gems_earned: 1,
            is_flagged: false,
            freeze_token_consumed: false,
            completed_at: now,
        };
        LedgerUpdate {
            streak,
            daily,
            achievements: vec![],
            lifetime,
            run,
            receipt,
        }
    }

    #[tokio::test]
    async fn test_apply_then_replay() {
        let db = MemoryDb::new();
        let first = db.apply_finish("u1", "s1", day(), &compute).await.unwrap();
        assert!(first.was_applied());

        let second = db.apply_finish("u1", "s1", day(), &compute).await.unwrap();
        assert!(!second.was_applied());
        assert_eq!(second.receipt(), first.receipt());

        let daily = db.get_daily_progress("u1", day()).await.unwrap().unwrap();
        assert_eq!(daily.seconds_completed, 600);
        let lifetime = db.get_lifetime_stats("u1").await.unwrap().unwrap();
        assert_eq!(lifetime.total_sessions, 1);
        assert_eq!(db.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_replay_by_other_owner_is_not_found() {
        let db = MemoryDb::new();
        db.apply_finish("u1", "s1", day(), &compute).await.unwrap();

        let err = db
            .apply_finish("u2", "s1", day(), &compute)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(db.get_streak("u2").await.unwrap().is_none());
        assert_eq!(db.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_owner_locks_released_after_finish() {
        let db = MemoryDb::new();
        db.apply_finish("u1", "s1", day(), &compute).await.unwrap();
        db.fail_on(LedgerStep::Commit);
        db.apply_finish("u2", "s2", day(), &compute)
            .await
            .unwrap_err();

        assert_eq!(db.locked_owner_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_failure_writes_nothing() {
        for step in [
            LedgerStep::LoadLedger,
            LedgerStep::StreakUpdate,
            LedgerStep::AchievementUpdate,
            LedgerStep::Commit,
        ] {
            let db = MemoryDb::new();
            db.fail_on(step);
            let err = db.apply_finish("u1", "s1", day(), &compute).await.unwrap_err();
            assert!(err.is_retryable());

            assert!(db.get_streak("u1").await.unwrap().is_none());
            assert!(db.get_daily_progress("u1", day()).await.unwrap().is_none());
            assert!(db.get_run("s1").await.unwrap().is_none());
            assert!(db.get_receipt("s1").await.unwrap().is_none());

            // One-shot: retry succeeds
            assert!(db
                .apply_finish("u1", "s1", day(), &compute)
                .await
                .unwrap()
                .was_applied());
        }
    }

    #[tokio::test]
    async fn test_init_achievements_keeps_existing_rows() {
        let db = MemoryDb::new();
        let mut unlocked = AchievementProgress::new("u1", "a");
        unlocked.unlock(1.0, Utc::now());
        db.init_achievements("u1", &[unlocked]).await.unwrap();
        db.init_achievements("u1", &[AchievementProgress::new("u1", "a")])
            .await
            .unwrap();

        let rows = db.get_achievements("u1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_unlocked);
        assert!(db.get_achievements("u2").await.unwrap().is_empty());
    }
}
