// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run session model.

use crate::models::GeoSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a run session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Active,
    Paused,
    /// Terminal: the session is read-only from here on
    Completed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit in which distance-based rewards are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Kilometers,
    Miles,
}

impl DistanceUnit {
    const METERS_PER_MILE: f64 = 1609.344;

    /// Convert meters into this unit.
    pub fn from_meters(&self, meters: f64) -> f64 {
        match self {
            DistanceUnit::Kilometers => meters / 1000.0,
            DistanceUnit::Miles => meters / Self::METERS_PER_MILE,
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "km" | "kilometers" => Ok(Self::Kilometers),
            "mi" | "miles" => Ok(Self::Miles),
            other => Err(format!("unknown distance unit: {}", other)),
        }
    }
}

/// A single run, created on start and frozen once completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    pub id: String,
    pub owner_id: String,
    pub state: SessionState,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub distance_meters: f64,
    /// Visual trail; a thinned subset of the accepted samples
    pub route: Vec<GeoSample>,
    pub average_pace_min_per_km: f64,
    pub peak_speed_mps: f64,
    pub calories_estimate: u32,
    pub gems_earned: u32,
    pub is_flagged: bool,
}

impl RunSession {
    pub fn new(id: String, owner_id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id,
            state: SessionState::Idle,
            start_time,
            end_time: None,
            elapsed_seconds: 0,
            distance_meters: 0.0,
            route: Vec::new(),
            average_pace_min_per_km: 0.0,
            peak_speed_mps: 0.0,
            calories_estimate: 0,
            gems_earned: 0,
            is_flagged: false,
        }
    }

    /// Record the anti-cheat outcome on a completed session.
    pub fn apply_verdict(&mut self, gems_earned: u32, is_flagged: bool) {
        self.gems_earned = gems_earned;
        self.is_flagged = is_flagged;
    }

    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_unit_conversion() {
        assert_eq!(DistanceUnit::Kilometers.from_meters(5200.0), 5.2);
        let miles = DistanceUnit::Miles.from_meters(1609.344 * 3.0);
        assert!((miles - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_unit_parse() {
        assert_eq!("km".parse::<DistanceUnit>().unwrap(), DistanceUnit::Kilometers);
        assert_eq!("MI".parse::<DistanceUnit>().unwrap(), DistanceUnit::Miles);
        assert!("furlong".parse::<DistanceUnit>().is_err());
    }
}
