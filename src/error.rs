// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Every error carries a stable machine-readable code (see [`AppError::code`])
//! plus a human-readable detail string.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// A finished session failed a physical plausibility check.
///
/// The session is rejected and no ledger row is touched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Distance {distance_km:.3} km is outside the accepted range [0, {max_km}] km")]
    Distance { distance_km: f64, max_km: f64 },

    #[error("Duration {duration_seconds}s is outside the accepted range (0, {max_seconds}] s")]
    Duration {
        duration_seconds: i64,
        max_seconds: i64,
    },

    #[error("Implied speed {implied_kph:.2} km/h is implausibly slow for {distance_km:.2} km")]
    Pace { implied_kph: f64, distance_km: f64 },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Distance { .. } => "DISTANCE_VIOLATION",
            ValidationError::Duration { .. } => "DURATION_VIOLATION",
            ValidationError::Pace { .. } => "PACE_VIOLATION",
        }
    }
}

/// A lifecycle call arrived in a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Owner already has an active session ({session_id})")]
    SessionAlreadyActive { session_id: String },

    #[error("Cannot {action} a session that is {from}")]
    InvalidTransition { from: String, action: &'static str },
}

impl StateError {
    pub fn code(&self) -> &'static str {
        match self {
            StateError::SessionAlreadyActive { .. } => "SESSION_ALREADY_ACTIVE",
            StateError::InvalidTransition { .. } => "INVALID_TRANSITION",
        }
    }
}

/// Ledger step that was executing when a persistence failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStep {
    LoadLedger,
    StreakUpdate,
    DailyGoalUpdate,
    AchievementUpdate,
    RunRecord,
    Commit,
}

impl LedgerStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStep::LoadLedger => "load_ledger",
            LedgerStep::StreakUpdate => "streak_update",
            LedgerStep::DailyGoalUpdate => "daily_goal_update",
            LedgerStep::AchievementUpdate => "achievement_update",
            LedgerStep::RunRecord => "run_record",
            LedgerStep::Commit => "commit",
        }
    }
}

impl fmt::Display for LedgerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Persistence failure during {step}: {message}")]
    Persistence { step: LedgerStep, message: String },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a persistence failure at `step`.
    pub fn persistence(step: LedgerStep, message: impl fmt::Display) -> Self {
        AppError::Persistence {
            step,
            message: message.to_string(),
        }
    }

    /// Stable error code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation(e) => e.code(),
            AppError::State(e) => e.code(),
            AppError::Persistence { .. } => "PERSISTENCE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Persistence { .. })
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Some(msg.clone())),
            AppError::Validation(e) => (StatusCode::UNPROCESSABLE_ENTITY, Some(e.to_string())),
            AppError::State(e) => (StatusCode::CONFLICT, Some(e.to_string())),
            AppError::Persistence { step, message } => {
                tracing::error!(step = %step, error = %message, "Ledger persistence error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some(format!("Ledger update failed at step '{}'; retry is safe", step)),
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
