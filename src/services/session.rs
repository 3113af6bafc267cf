// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run session lifecycle.
//!
//! `Idle -> Active` on start, `Active <-> Paused`, and `Active | Paused ->
//! Completed` on finish. Completed is terminal and read-only.
//!
//! Samples are buffered on ingest and pushed through the filter on the
//! next tick, so distance is only ever mutated from one place.

use crate::error::StateError;
use crate::models::{GeoSample, RunSession, SessionState};
use crate::services::accumulator::DistanceAccumulator;
use crate::services::filter::{GeoSampleFilter, RejectReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Values reported by the client when finishing a session.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct FinishReport {
    pub distance_meters: f64,
    pub duration_seconds: i64,
    /// Client-side average speed; derived from distance/duration when absent
    #[serde(default)]
    pub average_speed_kph: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub peak_speed_mps: Option<f64>,
    /// Full route recorded on the device; replaces the server-side trail
    #[serde(default)]
    #[validate(nested)]
    pub route: Option<Vec<GeoSample>>,
    /// Offset used to pick the calendar date the session counts for
    #[serde(default)]
    #[validate(range(min = -720, max = 840))]
    pub utc_offset_minutes: Option<i32>,
}

/// Per-session filter counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounters {
    pub accepted: u32,
    pub rejected_accuracy: u32,
    pub rejected_stationary: u32,
    pub jumps: u32,
}

/// Immutable view of a session, published after each complete update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub owner_id: String,
    pub state: SessionState,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub distance_meters: f64,
    pub current_pace_min_per_km: f64,
    pub average_pace_min_per_km: f64,
    pub calories_estimate: u32,
    pub peak_speed_mps: f64,
    pub route_points: usize,
    pub filter: FilterCounters,
}

/// Owns one session and drives the filter and accumulator for it.
#[derive(Debug)]
pub struct RunSessionMachine {
    session: RunSession,
    filter: GeoSampleFilter,
    accumulator: DistanceAccumulator,
    last_accepted: Option<GeoSample>,
    pending: Vec<GeoSample>,
    counters: FilterCounters,
    final_report: Option<FinishReport>,
}

impl RunSessionMachine {
    pub fn new(
        id: String,
        owner_id: String,
        created_at: DateTime<Utc>,
        calories_per_minute: f64,
    ) -> Self {
        Self {
            session: RunSession::new(id, owner_id, created_at),
            filter: GeoSampleFilter,
            accumulator: DistanceAccumulator::new(calories_per_minute),
            last_accepted: None,
            pending: Vec::new(),
            counters: FilterCounters::default(),
            final_report: None,
        }
    }

    pub fn session(&self) -> &RunSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Report the session was finished with, once Completed.
    pub fn final_report(&self) -> Option<&FinishReport> {
        self.final_report.as_ref()
    }

    /// `Idle -> Active`. Resets every accumulator and the route.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        self.transition("start", &[SessionState::Idle], SessionState::Active)?;
        self.accumulator.reset();
        self.session.route.clear();
        self.session.start_time = now;
        self.session.distance_meters = 0.0;
        self.session.elapsed_seconds = 0;
        self.last_accepted = None;
        self.pending.clear();
        self.counters = FilterCounters::default();
        Ok(())
    }

    /// `Active -> Paused`. Samples buffered before the pause still count.
    pub fn pause(&mut self) -> Result<(), StateError> {
        self.transition("pause", &[SessionState::Active], SessionState::Paused)?;
        self.drain_pending();
        self.sync_session();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), StateError> {
        self.transition("resume", &[SessionState::Paused], SessionState::Active)
    }

    /// Buffer a sample for the next tick. Only Active sessions take samples.
    pub fn ingest(&mut self, sample: GeoSample) -> bool {
        if self.session.state != SessionState::Active {
            return false;
        }
        self.pending.push(sample);
        true
    }

    /// One timer period. No-op unless Active.
    pub fn tick(&mut self) {
        if self.session.state != SessionState::Active {
            return;
        }
        self.drain_pending();
        self.accumulator.tick();
        self.sync_session();
    }

    /// `Active | Paused -> Completed`, freezing the session with the
    /// filtered totals. The report is kept alongside for validation.
    pub fn finish(
        &mut self,
        now: DateTime<Utc>,
        report: FinishReport,
    ) -> Result<&RunSession, StateError> {
        if !matches!(
            self.session.state,
            SessionState::Active | SessionState::Paused
        ) {
            return Err(self.invalid("finish"));
        }

        // Samples already in flight still count toward the trail
        self.drain_pending();
        self.accumulator.recompute();
        self.sync_session();

        if let Some(route) = report.route.as_ref().filter(|r| !r.is_empty()) {
            self.session.route = route.clone();
        }

        self.session.end_time = Some(now);
        self.session.state = SessionState::Completed;
        self.final_report = Some(report);
        Ok(&self.session)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session.id.clone(),
            owner_id: self.session.owner_id.clone(),
            state: self.session.state,
            start_time: self.session.start_time,
            end_time: self.session.end_time,
            elapsed_seconds: self.session.elapsed_seconds,
            distance_meters: self.session.distance_meters,
            current_pace_min_per_km: self.accumulator.current_pace_min_per_km,
            average_pace_min_per_km: self.session.average_pace_min_per_km,
            calories_estimate: self.session.calories_estimate,
            peak_speed_mps: self.session.peak_speed_mps,
            route_points: self.session.route.len(),
            filter: self.counters,
        }
    }

    fn drain_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for sample in pending {
            self.apply_sample(sample);
        }
    }

    fn apply_sample(&mut self, sample: GeoSample) {
        let decision =
            self.filter
                .evaluate(&sample, self.last_accepted.as_ref(), &self.session.route);

        tracing::trace!(
            session_id = %self.session.id,
            accepted = decision.accepted,
            delta = ?decision.distance_delta,
            route = decision.append_to_route,
            "Sample filtered"
        );

        match decision.reject_reason {
            Some(RejectReason::LowAccuracy) => self.counters.rejected_accuracy += 1,
            Some(RejectReason::Stationary) => self.counters.rejected_stationary += 1,
            None if decision.is_jump() => self.counters.jumps += 1,
            None => {}
        }

        if decision.accepted {
            self.counters.accepted += 1;
            if let Some(delta) = decision.distance_delta {
                self.accumulator.add_segment(delta);
                if let Some(previous) = self.last_accepted.as_ref() {
                    let seconds = sample.seconds_since(previous);
                    if seconds > 0.0 {
                        self.accumulator.observe_speed(delta / seconds);
                    }
                }
            }
            if let Some(speed) = sample.instant_speed_mps {
                self.accumulator.observe_speed(speed);
            }
        }

        if decision.append_to_route {
            self.session.route.push(sample.clone());
        }
        if decision.accepted {
            self.last_accepted = Some(sample);
        }
    }

    fn sync_session(&mut self) {
        self.session.distance_meters = self.accumulator.distance_meters;
        self.session.elapsed_seconds = self.accumulator.elapsed_seconds;
        self.session.average_pace_min_per_km = self.accumulator.average_pace_min_per_km;
        self.session.calories_estimate = self.accumulator.calories_estimate;
        self.session.peak_speed_mps = self.accumulator.peak_speed_mps;
    }

    fn transition(
        &mut self,
        action: &'static str,
        from: &[SessionState],
        to: SessionState,
    ) -> Result<(), StateError> {
        if !from.contains(&self.session.state) {
            return Err(self.invalid(action));
        }
        tracing::debug!(
            session_id = %self.session.id,
            from = %self.session.state,
            to = %to,
            "Session transition"
        );
        self.session.state = to;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> StateError {
        StateError::InvalidTransition {
            from: self.session.state.to_string(),
            action,
        }
    }
}
