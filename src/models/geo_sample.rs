// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Raw position sample as reported by the location sensor.

use chrono::{DateTime, Utc};
use geo::{Coord, Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One position fix. Ephemeral: owned by the live session that ingested it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeoSample {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// Radius of the 68% confidence circle reported by the sensor
    #[validate(range(min = 0.0))]
    pub horizontal_accuracy_meters: f64,
    pub timestamp: DateTime<Utc>,
    /// Speed reported by the sensor itself, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub instant_speed_mps: Option<f64>,
}

impl GeoSample {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &GeoSample) -> f64 {
        Haversine.distance(self.point(), other.point())
    }

    /// Seconds elapsed from `earlier` to this sample (fractional, may be negative).
    pub fn seconds_since(&self, earlier: &GeoSample) -> f64 {
        (self.timestamp - earlier.timestamp).num_milliseconds() as f64 / 1000.0
    }
}
