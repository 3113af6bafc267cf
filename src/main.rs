// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trailstreak API Server
//!
//! Tracks live runs from GPS samples and keeps each user's streak, daily
//! goal and achievement ledger.

use std::sync::Arc;
use trailstreak::{
    config::{Config, LedgerBackend},
    db::{FirestoreDb, LedgerStore, MemoryDb},
    time_utils::SystemClock,
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Trailstreak API");

    let store: Arc<dyn LedgerStore> = match config.ledger_backend {
        LedgerBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        LedgerBackend::Memory => {
            tracing::warn!("Using in-memory ledger; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    tracing::info!(
        minutes_goal = config.default_minutes_goal,
        freeze_policy = ?config.freeze_policy,
        distance_unit = ?config.distance_unit,
        "Ledger rules configured"
    );

    let port = config.port;
    let state = Arc::new(AppState::new(config, store, Arc::new(SystemClock)));

    // Build router
    let app = trailstreak::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trailstreak=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
