// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Ride Report: trip history, ratings and ride statistics.
//!
//! This crate provides the data layer behind the Ride Report app: persisted
//! trips with their routes and sensor data, JSON projections for upload,
//! locale-aware formatting and the HTTP API that serves them.

pub mod config;
pub mod db;
pub mod encoding;
pub mod error;
pub mod image;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod text;
pub mod time_utils;
pub mod units;

use config::Config;
use services::{TripService, WeatherService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub trips: TripService,
    pub weather: WeatherService,
}
