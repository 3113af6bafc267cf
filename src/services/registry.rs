// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registry of live run sessions.
//!
//! Each session is owned by one `SessionHandle`: its state machine sits
//! behind an async mutex so sample ingestion and the tick loop never
//! interleave, and a `watch` channel carries the last complete snapshot
//! to readers.

use crate::error::{AppError, Result, StateError};
use crate::models::{GeoSample, RunSession};
use crate::services::session::{FinishReport, RunSessionMachine, SessionSnapshot};
use crate::time_utils::Clock;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// One live session.
pub struct SessionHandle {
    owner_id: String,
    machine: Mutex<RunSessionMachine>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    fn new(machine: RunSessionMachine) -> Self {
        let owner_id = machine.session().owner_id.clone();
        let (snapshot_tx, _) = watch::channel(machine.snapshot());
        Self {
            owner_id,
            machine: Mutex::new(machine),
            snapshot_tx,
            ticker: std::sync::Mutex::new(None),
        }
    }

    /// Last published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Run one tick. Returns `false` once the session is completed.
    pub async fn tick(&self) -> bool {
        let mut machine = self.machine.lock().await;
        if machine.session().is_completed() {
            return false;
        }
        machine.tick();
        self.snapshot_tx.send_replace(machine.snapshot());
        true
    }

    fn set_ticker(&self, task: JoinHandle<()>) {
        if let Ok(mut slot) = self.ticker.lock() {
            *slot = Some(task);
        }
    }

    fn stop_ticker(&self) {
        if let Ok(mut slot) = self.ticker.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

/// Owns every live session of this process.
///
/// Completed sessions stay registered until their ledger update has been
/// committed, so a failed finish can be retried with the same id.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
    active_by_owner: DashMap<String, String>,
    clock: Arc<dyn Clock>,
    calories_per_minute: f64,
    tick_interval: Option<Duration>,
}

impl SessionRegistry {
    /// `tick_interval` of `None` leaves ticking to the caller.
    pub fn new(
        clock: Arc<dyn Clock>,
        calories_per_minute: f64,
        tick_interval: Option<Duration>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            active_by_owner: DashMap::new(),
            clock,
            calories_per_minute,
            tick_interval,
        }
    }

    /// StartSession: create and activate a session for `owner_id`.
    ///
    /// Fails with `SessionAlreadyActive` if the owner already has one.
    pub fn start(&self, owner_id: &str) -> Result<String> {
        let slot = match self.active_by_owner.entry(owner_id.to_string()) {
            Entry::Occupied(existing) => {
                return Err(StateError::SessionAlreadyActive {
                    session_id: existing.get().clone(),
                }
                .into());
            }
            Entry::Vacant(slot) => slot,
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        let now = self.clock.now();
        let mut machine = RunSessionMachine::new(
            session_id.clone(),
            owner_id.to_string(),
            now,
            self.calories_per_minute,
        );
        machine.start(now)?;

        let handle = Arc::new(SessionHandle::new(machine));
        if let Some(period) = self.tick_interval {
            handle.set_ticker(spawn_ticker(handle.clone(), period));
        }

        self.sessions.insert(session_id.clone(), handle);
        slot.insert(session_id.clone());

        tracing::info!(owner_id, session_id = %session_id, "Session started");
        Ok(session_id)
    }

    /// Look up a session owned by `owner_id`.
    ///
    /// Sessions owned by someone else are reported as missing.
    pub fn get(&self, owner_id: &str, session_id: &str) -> Result<Arc<SessionHandle>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| handle.owner_id == owner_id)
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))
    }

    /// Whether `session_id` is still held by the registry.
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of registered sessions, including completed ones awaiting commit.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Buffer samples for the next tick. Returns how many were taken.
    pub async fn ingest(
        &self,
        owner_id: &str,
        session_id: &str,
        samples: Vec<GeoSample>,
    ) -> Result<usize> {
        let handle = self.get(owner_id, session_id)?;
        let mut machine = handle.machine.lock().await;
        let taken = samples
            .into_iter()
            .map(|sample| machine.ingest(sample))
            .filter(|taken| *taken)
            .count();
        tracing::debug!(session_id, taken, "Samples buffered");
        Ok(taken)
    }

    pub async fn pause(&self, owner_id: &str, session_id: &str) -> Result<SessionSnapshot> {
        let handle = self.get(owner_id, session_id)?;
        let mut machine = handle.machine.lock().await;
        machine.pause()?;
        let snapshot = machine.snapshot();
        handle.snapshot_tx.send_replace(snapshot.clone());
        tracing::info!(owner_id, session_id, "Session paused");
        Ok(snapshot)
    }

    pub async fn resume(&self, owner_id: &str, session_id: &str) -> Result<SessionSnapshot> {
        let handle = self.get(owner_id, session_id)?;
        let mut machine = handle.machine.lock().await;
        machine.resume()?;
        let snapshot = machine.snapshot();
        handle.snapshot_tx.send_replace(snapshot.clone());
        tracing::info!(owner_id, session_id, "Session resumed");
        Ok(snapshot)
    }

    /// Drive one tick by hand (used when the background loop is disabled).
    pub async fn tick(&self, owner_id: &str, session_id: &str) -> Result<SessionSnapshot> {
        let handle = self.get(owner_id, session_id)?;
        handle.tick().await;
        Ok(handle.snapshot())
    }

    pub fn snapshot(&self, owner_id: &str, session_id: &str) -> Result<SessionSnapshot> {
        Ok(self.get(owner_id, session_id)?.snapshot())
    }

    /// Current trail of a live session.
    pub async fn route(&self, owner_id: &str, session_id: &str) -> Result<Vec<GeoSample>> {
        let handle = self.get(owner_id, session_id)?;
        let machine = handle.machine.lock().await;
        Ok(machine.session().route.clone())
    }

    /// Freeze the session and hand back the finalized copy.
    ///
    /// On a session that is already Completed (an earlier finish whose
    /// ledger commit failed) the frozen session and its original report are
    /// returned unchanged; `report` is ignored.
    pub async fn finalize(
        &self,
        owner_id: &str,
        session_id: &str,
        report: FinishReport,
    ) -> Result<(RunSession, FinishReport)> {
        let handle = self.get(owner_id, session_id)?;
        let mut machine = handle.machine.lock().await;

        if machine.session().is_completed() {
            let frozen = machine.session().clone();
            let original = machine.final_report().cloned().unwrap_or(report);
            tracing::debug!(session_id, "Finish retried on completed session");
            return Ok((frozen, original));
        }

        let now = self.clock.now();
        let frozen = machine.finish(now, report.clone())?.clone();
        handle.stop_ticker();
        handle.snapshot_tx.send_replace(machine.snapshot());
        self.release_owner(owner_id, session_id);

        tracing::info!(
            owner_id,
            session_id,
            elapsed_seconds = frozen.elapsed_seconds,
            distance_meters = frozen.distance_meters,
            "Session completed"
        );
        Ok((frozen, report))
    }

    /// Drop a completed session once nothing more will be done with it.
    pub fn remove(&self, session_id: &str) {
        if let Some((_, handle)) = self.sessions.remove(session_id) {
            handle.stop_ticker();
            self.release_owner(&handle.owner_id, session_id);
        }
    }

    fn release_owner(&self, owner_id: &str, session_id: &str) {
        self.active_by_owner
            .remove_if(owner_id, |_, active| active == session_id);
    }
}

/// Background 1 Hz (configurable) tick loop for one session.
fn spawn_ticker(handle: Arc<SessionHandle>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if !handle.tick().await {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionState;
    use crate::time_utils::FixedClock;
    use chrono::TimeZone;

    fn registry(tick: Option<Duration>) -> SessionRegistry {
        let clock = Arc::new(FixedClock::new(
            chrono::Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap(),
        ));
        SessionRegistry::new(clock, 10.0, tick)
    }

    #[tokio::test]
    async fn test_second_start_rejected_until_finished() {
        let reg = registry(None);
        let first = reg.start("alice").unwrap();

        let err = reg.start("alice").unwrap_err();
        assert_eq!(err.code(), "SESSION_ALREADY_ACTIVE");

        // Other owners are unaffected
        reg.start("bob").unwrap();

        reg.finalize("alice", &first, FinishReport::default())
            .await
            .unwrap();
        assert!(reg.start("alice").is_ok());
    }

    #[tokio::test]
    async fn test_other_owner_cannot_see_session() {
        let reg = registry(None);
        let id = reg.start("alice").unwrap();
        let err = reg.snapshot("mallory", &id).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_finalize_twice_returns_frozen_session() {
        let reg = registry(None);
        let id = reg.start("alice").unwrap();
        let report = FinishReport {
            distance_meters: 1200.0,
            duration_seconds: 600,
            ..Default::default()
        };
        let (first, _) = reg.finalize("alice", &id, report).await.unwrap();

        let other = FinishReport {
            distance_meters: 9999.0,
            duration_seconds: 1,
            ..Default::default()
        };
        let (second, original) = reg.finalize("alice", &id, other).await.unwrap();

        assert_eq!(second.distance_meters, first.distance_meters);
        assert_eq!(original.distance_meters, 1200.0);
        assert_eq!(reg.snapshot("alice", &id).unwrap().state, SessionState::Completed);

        reg.remove(&id);
        assert!(!reg.contains(&id));
    }

    #[tokio::test]
    async fn test_pause_publishes_snapshot() {
        let reg = registry(None);
        let id = reg.start("alice").unwrap();
        let handle = reg.get("alice", &id).unwrap();
        let mut rx = handle.subscribe();

        reg.pause("alice", &id).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().state, SessionState::Paused);

        let err = reg.pause("alice", &id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_ticker_counts_seconds() {
        let reg = registry(Some(Duration::from_secs(1)));
        let id = reg.start("alice").unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(reg.snapshot("alice", &id).unwrap().elapsed_seconds, 3);

        reg.pause("alice", &id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(reg.snapshot("alice", &id).unwrap().elapsed_seconds, 3);

        reg.finalize("alice", &id, FinishReport::default())
            .await
            .unwrap();
    }
}
