// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response};
use ride_report::config::Config;
use ride_report::db::{FirestoreStore, MemoryStore, RideStore};
use ride_report::routes::create_router;
use ride_report::services::{TripService, WeatherService};
use ride_report::AppState;
use std::sync::Arc;

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

/// Create a Firestore store against the emulator.
#[allow(dead_code)]
pub async fn test_store() -> FirestoreStore {
    FirestoreStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app over an empty in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_store(Arc::new(MemoryStore::new()))
}

#[allow(dead_code)]
pub fn create_test_app_with_store(store: Arc<dyn RideStore>) -> (axum::Router, Arc<AppState>) {
    let config = Config::default();
    let state = Arc::new(AppState {
        trips: TripService::new(store, config.rating_version),
        // No API key: finalize skips the weather lookup.
        weather: WeatherService::new("http://127.0.0.1:9", None),
        config,
    });

    (create_router(state.clone()), state)
}

/// Create a session token the auth middleware accepts.
#[allow(dead_code)]
pub fn create_test_jwt(profile_id: &str, signing_key: &Option<Vec<u8>>) -> String {
    let key = signing_key.as_deref().expect("test config has a signing key");
    ride_report::middleware::create_jwt(profile_id, key).expect("Failed to create JWT")
}

/// Authenticated request with an optional JSON body.
#[allow(dead_code)]
pub fn authed_request(
    state: &AppState,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let token = create_test_jwt("rider-1", &state.config.jwt_signing_key);
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

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// A trip upload payload with a two-point route heading north.
#[allow(dead_code)]
pub fn trip_payload(uuid: &str, start: &str, activity_type: i16) -> serde_json::Value {
    serde_json::json!({
        "uuid": uuid,
        "startDate": format!("{start}:00+0000"),
        "endDate": format!("{start}:30+0000"),
        "activityType": activity_type,
        "rating": 0,
        "length": 1112.0,
        "locations": [
            {"date": format!("{start}:00.000+0000"), "latitude": 45.50, "longitude": -122.68,
             "course": 0.0, "speed": 5.0, "horizontalAccuracy": 5.0, "source": 1},
            {"date": format!("{start}:30.000+0000"), "latitude": 45.51, "longitude": -122.68,
             "course": 0.0, "speed": 5.0, "horizontalAccuracy": 5.0, "source": 1}
        ]
    })
}
