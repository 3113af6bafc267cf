// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, Response},
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use trailstreak::config::Config;
use trailstreak::db::{FirestoreDb, MemoryDb};
use trailstreak::models::GeoSample;
use trailstreak::routes::create_router;
use trailstreak::time_utils::FixedClock;
use trailstreak::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Morning of day 1 in test time.
#[allow(dead_code)]
pub fn day_start(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, 7, 0, 0).unwrap()
}

/// Test app backed by the in-memory ledger and a fixed clock.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryDb>,
    pub clock: Arc<FixedClock>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn token(&self, owner_id: &str) -> String {
        create_test_jwt(owner_id, &self.state.config.jwt_signing_key)
    }
}

/// Create a test app with in-memory dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryDb::new());
    let clock = Arc::new(FixedClock::new(day_start(1)));
    let state = Arc::new(AppState::new(config, store.clone(), clock.clone()));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        clock,
    }
}

/// Create a test JWT token.
#[allow(dead_code)]
pub fn create_test_jwt(owner_id: &str, signing_key: &[u8]) -> String {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    #[derive(serde::Serialize)]
    struct Claims {
        sub: String,
        exp: usize,
        iat: usize,
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    encode(
        &Header::new(Algorithm::HS256),
        &Claims {
            sub: owner_id.to_string(),
            exp: now + 86400,
            iat: now,
        },
        &EncodingKey::from_secret(signing_key),
    )
    .unwrap()
}

/// Build an authenticated request, with a JSON body when given.
#[allow(dead_code)]
pub fn api_request(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));

    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// A sample `meters_north` north of a fixed origin.
#[allow(dead_code)]
pub fn sample_north(meters_north: f64, at: DateTime<Utc>) -> GeoSample {
    // ~111,195 m per degree of latitude on the haversine sphere
    GeoSample {
        latitude: 37.0 + meters_north / 111_195.0,
        longitude: -122.0,
        horizontal_accuracy_meters: 5.0,
        timestamp: at,
        instant_speed_mps: None,
    }
}

/// Finish report body for the HTTP API.
#[allow(dead_code)]
pub fn finish_body(distance_meters: f64, duration_seconds: i64) -> serde_json::Value {
    serde_json::json!({
        "distance_meters": distance_meters,
        "duration_seconds": duration_seconds,
    })
}
