// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{DailyProgress, FinishReceipt, GeoSample, StreakRecord};
use crate::services::{CategoryGroup, FinishReport, SessionSnapshot};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sessions", post(start_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/samples", post(ingest_samples))
        .route("/api/sessions/{id}/pause", post(pause_session))
        .route("/api/sessions/{id}/resume", post(resume_session))
        .route("/api/sessions/{id}/route", get(get_route))
        .route("/api/sessions/{id}/finish", post(finish_session))
        .route("/api/achievements", get(get_achievements))
        .route("/api/streak", get(get_streak))
        .route("/api/daily-progress", get(get_daily_progress))
}

fn validate_body<T: Validate>(body: &T) -> Result<()> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

// ─── Live Sessions ───────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StartSessionResponse {
    pub session_id: String,
}

/// Start a session. Only one active session per user.
async fn start_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<StartSessionResponse>)> {
    let session_id = state.sessions.start(&user.owner_id)?;
    Ok((StatusCode::CREATED, Json(StartSessionResponse { session_id })))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>> {
    Ok(Json(state.sessions.snapshot(&user.owner_id, &id)?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct IngestRequest {
    /// At most 1000 samples per request
    #[validate(length(min = 1, max = 1000), nested)]
    pub samples: Vec<GeoSample>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct IngestResponse {
    /// Samples queued for the next tick
    pub queued: usize,
    pub received: usize,
}

/// Queue samples for the session. They are filtered on the next tick.
async fn ingest_samples(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>)> {
    validate_body(&body)?;

    let received = body.samples.len();
    let queued = state
        .sessions
        .ingest(&user.owner_id, &id, body.samples)
        .await?;

    tracing::debug!(session_id = %id, received, queued, "Samples ingested");

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse { queued, received }),
    ))
}

async fn pause_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>> {
    Ok(Json(state.sessions.pause(&user.owner_id, &id).await?))
}

async fn resume_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>> {
    Ok(Json(state.sessions.resume(&user.owner_id, &id).await?))
}

/// Route trail as a GeoJSON LineString feature.
///
/// Live sessions serve their current trail; finished runs serve the stored
/// polyline.
async fn get_route(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<geojson::Feature>> {
    match state.sessions.route(&user.owner_id, &id).await {
        Ok(route) => {
            let coordinates = route
                .iter()
                .map(|s| vec![s.longitude, s.latitude])
                .collect();
            let span = route
                .first()
                .zip(route.last())
                .map(|(first, last)| (first.timestamp, last.timestamp));
            Ok(Json(route_feature(&id, coordinates, span)))
        }
        Err(AppError::NotFound(_)) => {
            let run = state
                .store
                .get_run(&id)
                .await?
                .filter(|run| run.owner_id == user.owner_id)
                .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))?;
            let coordinates = match run.route_polyline.as_deref() {
                Some(encoded) => polyline::decode_polyline(encoded, 5)
                    .map_err(|e| anyhow::anyhow!("Stored route for {} is corrupt: {}", id, e))?
                    .0
                    .into_iter()
                    .map(|c| vec![c.x, c.y])
                    .collect(),
                None => Vec::new(),
            };
            Ok(Json(route_feature(
                &id,
                coordinates,
                Some((run.started_at, run.ended_at)),
            )))
        }
        Err(e) => Err(e),
    }
}

fn route_feature(
    session_id: &str,
    coordinates: Vec<Vec<f64>>,
    span: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> geojson::Feature {
    let mut properties = geojson::JsonObject::new();
    properties.insert("session_id".to_string(), session_id.into());
    properties.insert("points".to_string(), coordinates.len().into());
    if let Some((started_at, ended_at)) = span {
        properties.insert("started_at".to_string(), started_at.to_rfc3339().into());
        properties.insert("ended_at".to_string(), ended_at.to_rfc3339().into());
    }

    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::LineString(
            coordinates,
        ))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Finish the session and apply it to the ledger.
///
/// Safe to retry: a repeated call returns the original receipt.
async fn finish_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(report): Json<FinishReport>,
) -> Result<Json<FinishReceipt>> {
    validate_body(&report)?;

    let receipt = state
        .finisher
        .finish_session(&state.sessions, &user.owner_id, &id, report)
        .await?;

    Ok(Json(receipt))
}

// ─── Ledger ──────────────────────────────────────────────────

async fn get_achievements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<CategoryGroup>>> {
    Ok(Json(state.finisher.get_achievements(&user.owner_id).await?))
}

async fn get_streak(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<StreakRecord>> {
    Ok(Json(state.finisher.get_streak(&user.owner_id).await?))
}

#[derive(Debug, Deserialize)]
struct DailyProgressQuery {
    /// YYYY-MM-DD; defaults to today
    date: Option<String>,
}

#[derive(Serialize)]
pub struct DailyProgressResponse {
    #[serde(flatten)]
    pub progress: DailyProgress,
    pub goal_met: bool,
    pub progress_ratio: f64,
}

async fn get_daily_progress(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<DailyProgressQuery>,
) -> Result<Json<DailyProgressResponse>> {
    let date = params
        .date
        .as_deref()
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| AppError::BadRequest(format!("Invalid date: {}", d)))
        })
        .transpose()?;

    let progress = state
        .finisher
        .get_daily_progress(&user.owner_id, date)
        .await?;

    Ok(Json(DailyProgressResponse {
        goal_met: progress.goal_met(),
        progress_ratio: progress.progress_ratio(),
        progress,
    }))
}
