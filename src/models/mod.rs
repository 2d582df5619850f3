// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod activity_type;
pub mod connected_app;
pub mod location;
pub mod prediction;
pub mod promotion;
pub mod prototrip;
pub mod rating;
pub mod sensor;
pub mod stats;
pub mod trip;

pub use activity::MotionActivity;
pub use activity_type::ActivityType;
pub use connected_app::ConnectedApp;
pub use location::{BoundingBox, Coordinate, Location, LocationSource};
pub use prediction::{PredictedActivity, Prediction, PredictionAggregator};
pub use promotion::Promotion;
pub use prototrip::Prototrip;
pub use rating::{Rating, RatingChoice, RatingVersion};
pub use sensor::{CollectionOwner, SensorDataCollection, SensorKind, SensorReading};
pub use stats::RideStats;
pub use trip::{Trip, TripReward};

use serde_json::Value;

/// Errors from parsing or validating model payloads.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Missing or mistyped field: {0}")]
    MissingField(&'static str),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Expected a JSON {0}")]
    WrongShape(&'static str),

    #[error("Value out of range for {0}: {1}")]
    OutOfRange(&'static str, i64),
}

pub(crate) fn json_str<'a>(value: &'a Value, key: &'static str) -> Result<&'a str, ModelError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or(ModelError::MissingField(key))
}

pub(crate) fn json_f64(value: &Value, key: &'static str) -> Result<f64, ModelError> {
    value
        .get(key)
        .and_then(Value::as_f64)
        .ok_or(ModelError::MissingField(key))
}

pub(crate) fn json_array<'a>(
    value: &'a Value,
    key: &'static str,
) -> Result<&'a Vec<Value>, ModelError> {
    value
        .get(key)
        .and_then(Value::as_array)
        .ok_or(ModelError::MissingField(key))
}
