// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Position sample filtering.
//!
//! Two independent decisions are made per raw sample:
//! - acceptance: whether the sample becomes the new current position, and
//!   whether it credits distance
//! - route inclusion: whether it is appended to the visual trail
//!
//! The filter is pure; the caller owns and updates session state.

use crate::models::GeoSample;

/// Samples with a worse accuracy radius are sensor noise.
pub const MAX_ACCURACY_METERS: f64 = 25.0;
/// Movements shorter than this are stationary jitter.
pub const MIN_MOVEMENT_METERS: f64 = 1.0;
/// Segments at or beyond this length are GPS jumps and credit no distance.
pub const MAX_SEGMENT_METERS: f64 = 100.0;

/// Minimum spacing between consecutive trail points.
pub const ROUTE_MIN_SPACING_METERS: f64 = 5.0;
pub const ROUTE_MIN_SPEED_MPS: f64 = 0.5;
pub const ROUTE_MAX_SPEED_MPS: f64 = 10.0;

/// Why a sample was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    LowAccuracy,
    Stationary,
}

/// Outcome of filtering one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterDecision {
    pub accepted: bool,
    pub reject_reason: Option<RejectReason>,
    /// Distance credited to the session; `None` for the first fix, rejects and jumps
    pub distance_delta: Option<f64>,
    pub append_to_route: bool,
    /// Accepted, but the segment was too long to be trusted
    pub jump: bool,
}

impl FilterDecision {
    pub fn is_jump(&self) -> bool {
        self.jump
    }
}

/// Stateless sample filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoSampleFilter;

impl GeoSampleFilter {
    /// Evaluate `sample` against the last accepted sample and the current trail.
    ///
    /// Noise samples (accuracy rule) never enter the trail; otherwise the
    /// route decision does not depend on the stationary or jump rules.
    pub fn evaluate(
        &self,
        sample: &GeoSample,
        previous_accepted: Option<&GeoSample>,
        route: &[GeoSample],
    ) -> FilterDecision {
        let (accepted, reject_reason, distance_delta) = self.accept(sample, previous_accepted);

        let append_to_route = reject_reason != Some(RejectReason::LowAccuracy)
            && self.include_in_route(sample, route);

        FilterDecision {
            accepted,
            reject_reason,
            distance_delta,
            append_to_route,
            jump: accepted && previous_accepted.is_some() && distance_delta.is_none(),
        }
    }

    /// Acceptance rules. Returns (accepted, reason, credited delta).
    fn accept(
        &self,
        sample: &GeoSample,
        previous: Option<&GeoSample>,
    ) -> (bool, Option<RejectReason>, Option<f64>) {
        if sample.horizontal_accuracy_meters > MAX_ACCURACY_METERS {
            return (false, Some(RejectReason::LowAccuracy), None);
        }

        let Some(previous) = previous else {
            return (true, None, None);
        };

        let delta = sample.distance_to(previous);
        if delta < MIN_MOVEMENT_METERS {
            return (false, Some(RejectReason::Stationary), None);
        }

        if delta > 0.0 && delta < MAX_SEGMENT_METERS {
            (true, None, Some(delta))
        } else {
            // Jump: becomes the current position without crediting distance
            (true, None, None)
        }
    }

    /// Trail thinning: always take the first two points, afterwards only
    /// points far enough from the last one at a plausible speed.
    pub fn include_in_route(&self, sample: &GeoSample, route: &[GeoSample]) -> bool {
        if route.len() < 2 {
            return true;
        }
        let Some(last) = route.last() else {
            return true;
        };

        let spacing = sample.distance_to(last);
        if spacing < ROUTE_MIN_SPACING_METERS {
            return false;
        }

        match implied_speed(sample, last, spacing) {
            Some(speed) => (ROUTE_MIN_SPEED_MPS..=ROUTE_MAX_SPEED_MPS).contains(&speed),
            None => false,
        }
    }
}

/// Speed between two samples; falls back to the sensor speed when the
/// timestamps do not advance.
fn implied_speed(sample: &GeoSample, earlier: &GeoSample, meters: f64) -> Option<f64> {
    let seconds = sample.seconds_since(earlier);
    if seconds > 0.0 {
        Some(meters / seconds)
    } else {
        sample.instant_speed_mps
    }
}
