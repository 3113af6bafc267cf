// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running and
//! FIRESTORE_EMULATOR_HOST to point at it.
//!
//! Owner ids are unique per run, so the emulator does not need resetting.

use std::sync::Arc;
use trailstreak::config::Config;
use trailstreak::db::LedgerStore;
use trailstreak::models::RunSession;
use trailstreak::services::{FinishReport, SessionFinisher};
use trailstreak::time_utils::FixedClock;

mod common;
use common::test_db;

/// Generate a unique owner id for test isolation.
fn unique_owner_id() -> String {
    format!("owner-{}", uuid::Uuid::new_v4())
}

fn completed(owner_id: &str, distance: f64, seconds: u64, day: u32) -> RunSession {
    let start = common::day_start(day);
    let mut session = RunSession::new(
        uuid::Uuid::new_v4().to_string(),
        owner_id.to_string(),
        start,
    );
    session.distance_meters = distance;
    session.elapsed_seconds = seconds;
    session.average_pace_min_per_km = (seconds as f64 / 60.0) / (distance / 1000.0);
    session.end_time = Some(start + chrono::Duration::seconds(seconds as i64));
    session
}

fn report(distance: f64, seconds: i64) -> FinishReport {
    FinishReport {
        distance_meters: distance,
        duration_seconds: seconds,
        ..Default::default()
    }
}

async fn finisher() -> (Arc<dyn LedgerStore>, SessionFinisher, Arc<FixedClock>) {
    let store: Arc<dyn LedgerStore> = Arc::new(test_db().await);
    let clock = Arc::new(FixedClock::new(common::day_start(1)));
    let finisher = SessionFinisher::new(&Config::test_default(), store.clone(), clock.clone());
    (store, finisher, clock)
}

// ═══════════════════════════════════════════════════════════════════════════
// FINISH TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_finish_writes_all_ledger_rows() {
    require_emulator!();

    let (store, finisher, _) = finisher().await;
    let owner_id = unique_owner_id();
    let session = completed(&owner_id, 5200.0, 1800, 1);

    let outcome = finisher
        .finish(&session, &report(5200.0, 1800))
        .await
        .unwrap();
    assert!(outcome.was_applied(), "First finish should apply");

    let receipt = outcome.into_receipt();
    assert_eq!(receipt.gems_earned, 5);
    assert_eq!(receipt.streak.current_streak, 1);

    let streak = store.get_streak(&owner_id).await.unwrap().unwrap();
    assert_eq!(streak.current_streak, 1);

    let day = store
        .get_daily_progress(&owner_id, common::day_start(1).date_naive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(day.seconds_completed, 1800);

    let run = store.get_run(&session.id).await.unwrap().unwrap();
    assert_eq!(run.owner_id, owner_id);
    assert_eq!(run.gems_earned, 5);

    let stored = store.get_receipt(&session.id).await.unwrap().unwrap();
    assert_eq!(stored, receipt);

    let achievements = store.get_achievements(&owner_id).await.unwrap();
    let unlocked: Vec<_> = achievements
        .iter()
        .filter(|a| a.is_unlocked)
        .map(|a| a.achievement_id.as_str())
        .collect();
    assert!(unlocked.contains(&"first_activity"));
    assert!(unlocked.contains(&"distance_5k"));

    println!("✓ Finish applied: owner_id={}", owner_id);
}

#[tokio::test]
async fn test_finish_replay_is_idempotent() {
    require_emulator!();

    let (store, finisher, _) = finisher().await;
    let owner_id = unique_owner_id();
    let session = completed(&owner_id, 3000.0, 1200, 1);

    let first = finisher
        .finish(&session, &report(3000.0, 1200))
        .await
        .unwrap();
    let second = finisher
        .finish(&session, &report(3000.0, 1200))
        .await
        .unwrap();

    assert!(first.was_applied());
    assert!(!second.was_applied(), "Replay should be a duplicate");
    assert_eq!(first.receipt(), second.receipt());

    let stats = store.get_lifetime_stats(&owner_id).await.unwrap().unwrap();
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_active_seconds, 1200);

    println!("✓ Replay idempotent: owner_id={}", owner_id);
}

#[tokio::test]
async fn test_streak_across_days() {
    require_emulator!();

    let (store, finisher, clock) = finisher().await;
    let owner_id = unique_owner_id();

    for day in [1, 2, 3, 6] {
        clock.set(common::day_start(day));
        finisher
            .finish(&completed(&owner_id, 2500.0, 900, day), &report(2500.0, 900))
            .await
            .unwrap();
    }

    let streak = store.get_streak(&owner_id).await.unwrap().unwrap();
    assert_eq!(streak.current_streak, 1);
    assert_eq!(streak.longest_streak, 3);

    println!("✓ Streak reset after gap: owner_id={}", owner_id);
}

#[tokio::test]
async fn test_concurrent_finishes_use_transactions() {
    require_emulator!();

    let (store, finisher, _) = finisher().await;
    let finisher = Arc::new(finisher);
    let owner_id = unique_owner_id();

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let finisher = finisher.clone();
            let session = completed(&owner_id, 1000.0, 300, 1);
            tokio::spawn(async move { finisher.finish(&session, &report(1000.0, 300)).await })
        })
        .collect();

    let mut applied = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(outcome) => {
                assert!(outcome.was_applied());
                applied += 1;
            }
            // Contention beyond the retry budget surfaces as retryable
            Err(e) => assert!(e.is_retryable()),
        }
    }

    // Every committed finish is reflected exactly once
    let stats = store.get_lifetime_stats(&owner_id).await.unwrap().unwrap();
    assert!(applied >= 1);
    assert_eq!(stats.total_sessions, applied);
    assert_eq!(stats.total_active_seconds, u64::from(applied) * 300);

    println!(
        "✓ Concurrent finishes: owner_id={} applied={}",
        owner_id, applied
    );
}

#[tokio::test]
async fn test_concurrent_replays_apply_once() {
    require_emulator!();

    let (store, finisher, _) = finisher().await;
    let finisher = Arc::new(finisher);
    let owner_id = unique_owner_id();
    let session = completed(&owner_id, 1000.0, 300, 1);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let finisher = finisher.clone();
            let session = session.clone();
            tokio::spawn(async move { finisher.finish(&session, &report(1000.0, 300)).await })
        })
        .collect();

    let mut applied = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(outcome) if outcome.was_applied() => applied += 1,
            Ok(outcome) => assert_eq!(outcome.receipt().session_id, session.id),
            Err(e) => assert!(e.is_retryable()),
        }
    }
    assert_eq!(applied, 1, "Exactly one finish commits");

    let stats = store.get_lifetime_stats(&owner_id).await.unwrap().unwrap();
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_active_seconds, 300);

    let day = store
        .get_daily_progress(&owner_id, common::day_start(1).date_naive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(day.seconds_completed, 300);

    println!("✓ Concurrent replays applied once: owner_id={}", owner_id);
}

// ═══════════════════════════════════════════════════════════════════════════
// ACHIEVEMENT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_achievement_rows_created_on_first_read() {
    require_emulator!();

    let (store, finisher, _) = finisher().await;
    let owner_id = unique_owner_id();

    assert!(store.get_achievements(&owner_id).await.unwrap().is_empty());

    let groups = finisher.get_achievements(&owner_id).await.unwrap();
    let total: usize = groups.iter().map(|g| g.achievements.len()).sum();

    let rows = store.get_achievements(&owner_id).await.unwrap();
    assert_eq!(rows.len(), total);
    assert!(rows.iter().all(|r| !r.is_unlocked));

    // A second read does not duplicate rows
    finisher.get_achievements(&owner_id).await.unwrap();
    assert_eq!(store.get_achievements(&owner_id).await.unwrap().len(), total);

    println!("✓ Achievement rows initialized: owner_id={}", owner_id);
}
