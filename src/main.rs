// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ride Report API Server
//!
//! Serves trip history, ratings, stats and promotions over HTTP.
//!
//! `ride-report token <profile-id>` prints a session token for a rider
//! instead of starting the server.

use anyhow::Context;
use ride_report::{
    config::Config,
    db::{FirestoreStore, MemoryStore, RideStore},
    middleware::create_jwt,
    services::{keychain::accounts, Keychain, TripService, WeatherService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bytes of entropy in a generated session signing key.
const GENERATED_KEY_LEN: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let mut config = Config::from_env().context("Failed to load configuration")?;

    // Secrets not supplied through the environment come from the keychain
    let keychain = Keychain::open(&config.keychain_path, &config.keychain_secret)
        .await
        .context("Failed to open keychain")?;
    resolve_secrets(&mut config, &keychain).await?;

    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        return run_command(&command, args.next(), &config);
    }

    tracing::info!(port = config.port, "Starting Ride Report API");

    let store: Arc<dyn RideStore> = match &config.gcp_project_id {
        Some(project_id) => Arc::new(
            FirestoreStore::new(project_id)
                .await
                .context("Failed to connect to Firestore")?,
        ),
        None => {
            tracing::warn!("GCP_PROJECT_ID not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let weather = WeatherService::new(
        config.weather_api_url.clone(),
        config.openweathermap_api_key.clone(),
    );
    if !weather.is_configured() {
        tracing::info!("No weather API key, trips will be finalized without weather");
    }

    let state = Arc::new(AppState {
        trips: TripService::new(store, config.rating_version),
        weather,
        config: config.clone(),
    });

    // Build router
    let app = ride_report::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Fill in the signing key and weather key from the keychain. A signing key
/// is generated and stored on first run.
async fn resolve_secrets(config: &mut Config, keychain: &Keychain) -> anyhow::Result<()> {
    if config.jwt_signing_key.is_none() {
        let generated = hex::encode(keychain.random_bytes(GENERATED_KEY_LEN)?);
        let key = keychain
            .get_or_insert_with(accounts::JWT_SIGNING_KEY, || generated)
            .await?;
        config.jwt_signing_key = Some(key.into_bytes());
    }

    if config.openweathermap_api_key.is_none() {
        config.openweathermap_api_key = keychain.get(accounts::OPENWEATHERMAP_API_KEY).await?;
    }
    Ok(())
}

fn run_command(command: &str, argument: Option<String>, config: &Config) -> anyhow::Result<()> {
    match command {
        "token" => {
            let profile_id = argument.context("usage: ride-report token <profile-id>")?;
            let key = config
                .jwt_signing_key
                .as_deref()
                .context("JWT signing key unavailable")?;
            println!("{}", create_jwt(&profile_id, key)?);
            Ok(())
        }
        other => anyhow::bail!("Unknown command: {other}"),
    }
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ride_report=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
