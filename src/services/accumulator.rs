// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Running distance, pace and calorie totals for a live session.

/// Bounds for the pace-based calorie multiplier.
const MIN_PACE_MULTIPLIER: f64 = 0.5;
const MAX_PACE_MULTIPLIER: f64 = 2.0;

/// Accumulates filtered distance and derives pace and calories per tick.
///
/// `average_pace_min_per_km` is the pace-to-date recomputed from totals on
/// every tick, identical to `current_pace_min_per_km`. It is not a
/// windowed or smoothed average.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceAccumulator {
    base_rate_per_minute: f64,
    pub distance_meters: f64,
    pub elapsed_seconds: u64,
    pub current_pace_min_per_km: f64,
    pub average_pace_min_per_km: f64,
    pub calories_estimate: u32,
    pub peak_speed_mps: f64,
}

impl DistanceAccumulator {
    pub fn new(base_rate_per_minute: f64) -> Self {
        Self {
            base_rate_per_minute,
            distance_meters: 0.0,
            elapsed_seconds: 0,
            current_pace_min_per_km: 0.0,
            average_pace_min_per_km: 0.0,
            calories_estimate: 0,
            peak_speed_mps: 0.0,
        }
    }

    /// Zero every total, keeping the calorie base rate.
    pub fn reset(&mut self) {
        *self = Self::new(self.base_rate_per_minute);
    }

    /// Credit a filtered segment.
    pub fn add_segment(&mut self, meters: f64) {
        self.distance_meters += meters;
    }

    /// Record an observed speed for the peak.
    pub fn observe_speed(&mut self, speed_mps: f64) {
        if speed_mps.is_finite() && speed_mps > self.peak_speed_mps {
            self.peak_speed_mps = speed_mps;
        }
    }

    /// One timer tick: one more active second, then recompute.
    pub fn tick(&mut self) {
        self.elapsed_seconds += 1;
        self.recompute();
    }

    /// Replace the totals with final values and recompute once.
    pub fn settle(&mut self, distance_meters: f64, elapsed_seconds: u64) {
        self.distance_meters = distance_meters;
        self.elapsed_seconds = elapsed_seconds;
        self.recompute();
    }

    /// Derive pace and calories from totals.
    ///
    /// With no distance yet, the previous values are kept.
    pub fn recompute(&mut self) {
        if self.distance_meters <= 0.0 {
            return;
        }

        let elapsed_minutes = self.elapsed_seconds as f64 / 60.0;
        let pace = elapsed_minutes / (self.distance_meters / 1000.0);

        self.current_pace_min_per_km = pace;
        self.average_pace_min_per_km = pace;

        let multiplier = (1.0 / pace.max(1.0)).clamp(MIN_PACE_MULTIPLIER, MAX_PACE_MULTIPLIER);
        self.calories_estimate =
            (elapsed_minutes * self.base_rate_per_minute * multiplier).floor() as u32;
    }
}
