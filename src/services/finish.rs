// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session finish processing.
//!
//! Handles the core workflow:
//! 1. Freeze the live session with its filtered totals
//! 2. Anti-cheat validation of the client's reported totals (rejections
//!    leave the ledger untouched)
//! 3. Daily goal, streak and achievement updates
//! 4. Atomically store the ledger rows, run record and receipt
//!
//! Retrying a finish with the same session id is always safe: the store
//! applies a session at most once and replays return the stored receipt.

use crate::config::Config;
use crate::db::LedgerStore;
use crate::error::{AppError, Result};
use crate::models::{
    ApplyOutcome, DailyProgress, FinishReceipt, LedgerSnapshot,
    LedgerUpdate, RunRecord, RunSession, StreakRecord,
};
use crate::services::accumulator::DistanceAccumulator;
use crate::services::achievements::{AchievementEngine, AchievementFacts, CategoryGroup};
use crate::services::anti_cheat::{AntiCheatValidator, AntiCheatVerdict};
use crate::services::daily_goal::DailyGoalTracker;
use crate::services::registry::SessionRegistry;
use crate::services::session::FinishReport;
use crate::services::streak::StreakEngine;
use crate::time_utils::{format_utc_rfc3339, local_date, Clock};
use chrono::NaiveDate;
use std::sync::Arc;

/// Precision used for stored route polylines.
const POLYLINE_PRECISION: u32 = 5;

pub struct SessionFinisher {
    store: Arc<dyn LedgerStore>,
    validator: AntiCheatValidator,
    streaks: StreakEngine,
    daily: DailyGoalTracker,
    achievements: AchievementEngine,
    clock: Arc<dyn Clock>,
    default_utc_offset_minutes: i32,
    calories_per_minute: f64,
}

impl SessionFinisher {
    pub fn new(config: &Config, store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            validator: AntiCheatValidator::new(config.distance_unit),
            streaks: StreakEngine::new(config.freeze_policy),
            daily: DailyGoalTracker::new(config.default_minutes_goal),
            achievements: AchievementEngine::default(),
            clock,
            default_utc_offset_minutes: config.default_utc_offset_minutes,
            calories_per_minute: config.calories_per_minute,
        }
    }

    /// FinishSession as seen by clients.
    ///
    /// A session that is no longer live may already have been applied; in
    /// that case the stored receipt is returned. A completed session whose
    /// ledger commit failed stays registered so the same call can be retried.
    pub async fn finish_session(
        &self,
        registry: &SessionRegistry,
        owner_id: &str,
        session_id: &str,
        report: FinishReport,
    ) -> Result<FinishReceipt> {
        if registry.contains(session_id) {
            match registry.finalize(owner_id, session_id, report).await {
                Ok((session, report)) => {
                    return self
                        .apply_completed(registry, &session, &report)
                        .await;
                }
                // Removed by a concurrent finish after the check above
                Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        match self.store.get_receipt(session_id).await? {
            Some(receipt) if receipt.owner_id == owner_id => {
                tracing::debug!(session_id, "Finish replayed from stored receipt");
                Ok(receipt)
            }
            _ => Err(AppError::NotFound(format!("Session {}", session_id))),
        }
    }

    async fn apply_completed(
        &self,
        registry: &SessionRegistry,
        session: &RunSession,
        report: &FinishReport,
    ) -> Result<FinishReceipt> {
        let owner_id = session.owner_id.as_str();
        let session_id = session.id.as_str();

        match self.finish(session, report).await {
            Ok(outcome) => {
                registry.remove(session_id);
                Ok(outcome.into_receipt())
            }
            Err(e @ AppError::Validation(_)) => {
                tracing::warn!(owner_id, session_id, error = %e, "Session rejected");
                registry.remove(session_id);
                Err(e)
            }
            Err(e) => {
                tracing::error!(
                    owner_id,
                    session_id,
                    error = %e,
                    "Finish failed, session kept for retry"
                );
                Err(e)
            }
        }
    }

    /// Validate a completed session and apply it to the owner's ledger.
    pub async fn finish(&self, session: &RunSession, report: &FinishReport) -> Result<ApplyOutcome> {
        let owner_id = session.owner_id.as_str();
        let session_id = session.id.as_str();

        let verdict = self.validator.validate(
            report.distance_meters,
            report.duration_seconds,
            report.average_speed_kph,
        )?;

        if verdict.is_flagged {
            tracing::warn!(
                owner_id,
                session_id,
                implied_speed_kph = verdict.implied_speed_kph,
                "Session flagged for audit"
            );
        }

        let now = self.clock.now();
        let offset = report
            .utc_offset_minutes
            .unwrap_or(self.default_utc_offset_minutes);
        let date = local_date(session.end_time.unwrap_or(now), offset);

        let mut session = session.clone();
        session.apply_verdict(verdict.gems_earned, verdict.is_flagged);
        let run = build_run_record(&session, report, self.calories_per_minute, date, now);

        let compute = |snapshot: LedgerSnapshot| -> LedgerUpdate {
            self.compute_update(snapshot, &run, &verdict, date, now)
        };

        let outcome = self
            .store
            .apply_finish(owner_id, session_id, date, &compute)
            .await?;

        if outcome.was_applied() {
            let receipt = outcome.receipt();
            tracing::info!(
                owner_id,
                session_id,
                %date,
                gems = receipt.gems_earned,
                streak = receipt.streak.current_streak,
                unlocked = ?receipt.unlocked_achievements,
                "Session finished"
            );
        }

        Ok(outcome)
    }

    /// Pure ledger computation. Daily progress is credited first so the
    /// streak sees this session's contribution to the goal.
    fn compute_update(
        &self,
        snapshot: LedgerSnapshot,
        run: &RunRecord,
        verdict: &AntiCheatVerdict,
        date: NaiveDate,
        now: chrono::DateTime<chrono::Utc>,
    ) -> LedgerUpdate {
        let owner_id = run.owner_id.as_str();

        let daily = self.daily.accumulate(
            owner_id,
            date,
            snapshot.daily,
            run.elapsed_seconds,
            verdict.gems_earned,
        );

        let streak = self
            .streaks
            .evaluate(owner_id, snapshot.streak, date, daily.goal_met(), now);

        let mut lifetime = snapshot.lifetime;
        lifetime.record_run(run, &format_utc_rfc3339(now));

        let facts = AchievementFacts {
            session_distance_meters: run.distance_meters,
            session_pace_min_per_km: (run.distance_meters > 0.0)
                .then_some(run.average_pace_min_per_km),
            current_streak: streak.record.current_streak,
            lifetime_sessions: lifetime.total_sessions,
            lifetime_distance_meters: lifetime.total_distance_meters,
            social_connections: snapshot.social_connections,
        };
        let evaluation = self
            .achievements
            .evaluate(owner_id, snapshot.achievements, &facts, now);

        let receipt = FinishReceipt {
            session_id: run.session_id.clone(),
            owner_id: owner_id.to_string(),
            streak: streak.record.clone(),
            daily_progress: daily.clone(),
            unlocked_achievements: evaluation
                .newly_unlocked
                .iter()
                .map(|d| d.title.to_string())
                .collect(),
            gems_earned: verdict.gems_earned,
            is_flagged: verdict.is_flagged,
            freeze_token_consumed: streak.freeze_token_consumed,
            completed_at: now,
        };

        LedgerUpdate {
            streak: streak.record,
            daily,
            achievements: evaluation.rows,
            lifetime,
            run: run.clone(),
            receipt,
        }
    }

    // ─── Ledger Queries ──────────────────────────────────────────

    /// GetAchievements: catalog joined with the owner's progress.
    ///
    /// Missing progress rows are created on first read.
    pub async fn get_achievements(&self, owner_id: &str) -> Result<Vec<CategoryGroup>> {
        let existing = self.store.get_achievements(owner_id).await?;
        let (rows, created) = self.achievements.ensure_rows(owner_id, existing);
        if created {
            self.store.init_achievements(owner_id, &rows).await?;
            tracing::debug!(owner_id, "Initialized achievement rows");
        }
        Ok(self.achievements.group(&rows))
    }

    pub async fn get_streak(&self, owner_id: &str) -> Result<StreakRecord> {
        Ok(self
            .store
            .get_streak(owner_id)
            .await?
            .unwrap_or_else(|| StreakRecord::new(owner_id)))
    }

    /// Progress for `date`, defaulting to the owner's local today.
    pub async fn get_daily_progress(
        &self,
        owner_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<DailyProgress> {
        let date =
            date.unwrap_or_else(|| local_date(self.clock.now(), self.default_utc_offset_minutes));
        Ok(self
            .store
            .get_daily_progress(owner_id, date)
            .await?
            .unwrap_or_else(|| self.daily.empty_day(owner_id, date)))
    }
}

/// Persisted form of a completed session.
///
/// Distance and duration come from the report; pace and calories are
/// derived from them the same way the live accumulator does.
fn build_run_record(
    session: &RunSession,
    report: &FinishReport,
    calories_per_minute: f64,
    date: NaiveDate,
    now: chrono::DateTime<chrono::Utc>,
) -> RunRecord {
    let route_polyline = if session.route.is_empty() {
        None
    } else {
        polyline::encode_coordinates(session.route.iter().map(|s| s.coord()), POLYLINE_PRECISION)
            .map_err(|e| {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to encode route");
            })
            .ok()
    };

    let mut totals = DistanceAccumulator::new(calories_per_minute);
    totals.settle(
        report.distance_meters,
        u64::try_from(report.duration_seconds).unwrap_or(0),
    );
    totals.observe_speed(session.peak_speed_mps);
    if let Some(peak) = report.peak_speed_mps {
        totals.observe_speed(peak);
    }

    RunRecord {
        session_id: session.id.clone(),
        owner_id: session.owner_id.clone(),
        activity_date: date,
        started_at: session.start_time,
        ended_at: session.end_time.unwrap_or(now),
        elapsed_seconds: totals.elapsed_seconds,
        distance_meters: totals.distance_meters,
        tracked_distance_meters: session.distance_meters,
        average_pace_min_per_km: totals.average_pace_min_per_km,
        peak_speed_mps: totals.peak_speed_mps,
        calories_estimate: totals.calories_estimate,
        gems_earned: session.gems_earned,
        is_flagged: session.is_flagged,
        route_polyline,
        route_points: u32::try_from(session.route.len()).unwrap_or(u32::MAX),
    }
}
