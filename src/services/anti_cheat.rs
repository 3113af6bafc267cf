// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Physical plausibility checks for finished sessions.
//!
//! Hard violations reject the session outright. An elite-level average
//! speed only flags the session for audit; it is still rewarded.

use crate::error::ValidationError;
use crate::models::DistanceUnit;

/// Longest accepted session (~100 miles). Zero is accepted.
pub const MAX_DISTANCE_KM: f64 = 160.0;
pub const MAX_DURATION_SECONDS: i64 = 86_400;
/// Slower than this over a meaningful distance means a GPS artifact.
pub const MIN_PLAUSIBLE_SPEED_KPH: f64 = 0.8;
pub const PACE_CHECK_MIN_DISTANCE_KM: f64 = 1.6;
/// Average speeds above this (~27 mph) are flagged, not rejected.
pub const ELITE_SPEED_KPH: f64 = 43.0;

/// Result of a passing validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntiCheatVerdict {
    pub distance_km: f64,
    pub duration_seconds: u64,
    pub implied_speed_kph: f64,
    pub is_flagged: bool,
    /// One gem per whole distance unit
    pub gems_earned: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct AntiCheatValidator {
    unit: DistanceUnit,
}

impl AntiCheatValidator {
    pub fn new(unit: DistanceUnit) -> Self {
        Self { unit }
    }

    pub fn validate(
        &self,
        distance_meters: f64,
        duration_seconds: i64,
        reported_average_speed_kph: Option<f64>,
    ) -> Result<AntiCheatVerdict, ValidationError> {
        let distance_km = distance_meters / 1000.0;
        if !distance_km.is_finite() || !(0.0..=MAX_DISTANCE_KM).contains(&distance_km) {
            return Err(ValidationError::Distance {
                distance_km,
                max_km: MAX_DISTANCE_KM,
            });
        }

        if duration_seconds <= 0 || duration_seconds > MAX_DURATION_SECONDS {
            return Err(ValidationError::Duration {
                duration_seconds,
                max_seconds: MAX_DURATION_SECONDS,
            });
        }

        let duration_hours = duration_seconds as f64 / 3600.0;
        let implied_speed_kph = distance_km / duration_hours;

        if implied_speed_kph < MIN_PLAUSIBLE_SPEED_KPH && distance_km > PACE_CHECK_MIN_DISTANCE_KM
        {
            return Err(ValidationError::Pace {
                implied_kph: implied_speed_kph,
                distance_km,
            });
        }

        let average_speed_kph = reported_average_speed_kph
            .filter(|s| s.is_finite())
            .unwrap_or(implied_speed_kph);
        let is_flagged = average_speed_kph > ELITE_SPEED_KPH;

        let gems_earned = self.unit.from_meters(distance_meters).floor() as u32;

        Ok(AntiCheatVerdict {
            distance_km,
            duration_seconds: duration_seconds as u64,
            implied_speed_kph,
            is_flagged,
            gems_earned,
        })
    }
}
