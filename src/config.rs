//! Application configuration loaded from environment variables.
//!
//! A `.env` file is honoured for local development.

use crate::models::DistanceUnit;
use crate::services::streak::FreezePolicy;
use std::env;
use std::str::FromStr;

/// Which `LedgerStore` implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    /// In-process store (single instance, not durable across restarts)
    Memory,
    /// Google Cloud Firestore
    Firestore,
}

impl FromStr for LedgerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "firestore" => Ok(Self::Firestore),
            _ => Err(ConfigError::Invalid("LEDGER_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore backend only)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    pub ledger_backend: LedgerBackend,

    // --- Gamification rules ---
    /// Daily goal assigned to a freshly created DailyProgress row
    pub default_minutes_goal: u32,
    /// Base calorie burn per active minute before the pace multiplier
    pub calories_per_minute: f64,
    /// Unit in which one gem is earned per whole unit of distance
    pub distance_unit: DistanceUnit,
    pub freeze_policy: FreezePolicy,
    /// Offset used to derive a session's calendar date when the client sends none
    pub default_utc_offset_minutes: i32,
    /// Tick period for live sessions; 0 disables the background tick loop
    pub tick_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            ledger_backend: parse_or("LEDGER_BACKEND", LedgerBackend::Memory)?,
            default_minutes_goal: parse_or("DEFAULT_MINUTES_GOAL", 15)?,
            calories_per_minute: parse_or("CALORIES_PER_MINUTE", 10.0)?,
            distance_unit: parse_or("DISTANCE_UNIT", DistanceUnit::Kilometers)?,
            freeze_policy: parse_or("STREAK_FREEZE_POLICY", FreezePolicy::Disabled)?,
            default_utc_offset_minutes: parse_or("DEFAULT_UTC_OFFSET_MINUTES", 0)?,
            tick_interval_ms: parse_or("TICK_INTERVAL_MS", 1000)?,
        })
    }

    /// Deterministic configuration for tests.
    ///
    /// The background tick loop is off so tests drive ticks explicitly.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            ledger_backend: LedgerBackend::Memory,
            default_minutes_goal: 15,
            calories_per_minute: 10.0,
            distance_unit: DistanceUnit::Kilometers,
            freeze_policy: FreezePolicy::Disabled,
            default_utc_offset_minutes: 0,
            tick_interval_ms: 0,
        }
    }
}

/// Read `key` and parse it, using `default` when it is unset.
fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
