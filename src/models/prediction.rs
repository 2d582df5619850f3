// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Classifier predictions and their aggregation over a route.

use crate::models::sensor::{parse_list, AccelerometerReading};
use crate::models::{json_f64, ActivityType, Location, ModelError};
use crate::time_utils::{duration_from_secs_f64, ms_json_date_string};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Extra slack added to a prediction window when gathering readings.
const READING_WINDOW_SLACK_SECONDS: f64 = 0.1;

/// One activity class with its confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictedActivity {
    pub activity_type: ActivityType,
    pub confidence: f64,
}

impl PredictedActivity {
    pub fn new(activity_type: ActivityType, confidence: f64) -> Self {
        Self {
            activity_type,
            confidence,
        }
    }

    pub fn json_dictionary(&self) -> Value {
        json!({
            "confidence": self.confidence,
            "activityType": self.activity_type.raw(),
        })
    }

    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let raw = value
            .get("activityType")
            .and_then(Value::as_i64)
            .ok_or(ModelError::MissingField("activityType"))?;
        Ok(Self {
            activity_type: i16::try_from(raw).map_or(ActivityType::Unknown, ActivityType::from),
            confidence: json_f64(value, "confidence")?,
        })
    }

    pub fn debug_description(&self) -> String {
        format!("{}: {:.2}", self.activity_type.emoji(), self.confidence)
    }
}

/// A single classifier run over a window of accelerometer readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub model_identifier: Option<String>,
    #[serde(default)]
    pub predicted_activities: Vec<PredictedActivity>,
}

impl Prediction {
    pub fn new(start_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            model_identifier: None,
            predicted_activities: Vec::new(),
        }
    }

    pub fn add_unknown_type_predicted_activity(&mut self) {
        self.predicted_activities
            .push(PredictedActivity::new(ActivityType::Unknown, 1.0));
    }

    pub fn set_predicted_activities(&mut self, class_confidences: &BTreeMap<ActivityType, f64>) {
        self.predicted_activities = class_confidences
            .iter()
            .map(|(&t, &c)| PredictedActivity::new(t, c))
            .collect();
    }

    pub fn top_predicted_activity(&self) -> Option<&PredictedActivity> {
        self.predicted_activities
            .iter()
            .fold(None, |best: Option<&PredictedActivity>, p| match best {
                Some(b) if b.confidence >= p.confidence => Some(b),
                _ => Some(p),
            })
    }

    /// Readings covering this prediction's window, in date order.
    ///
    /// The window opens at the first reading at or after `start_date` and
    /// spans `interval` seconds plus a little slack.
    pub fn readings_in_window<'a>(
        &self,
        readings: &'a [AccelerometerReading],
        interval: f64,
    ) -> Vec<&'a AccelerometerReading> {
        let mut sorted: Vec<&AccelerometerReading> = readings.iter().collect();
        sorted.sort_by_key(|r| r.date);

        let Some(first) = sorted.iter().find(|r| r.date >= self.start_date) else {
            return Vec::new();
        };
        let window_start = first.date;
        let window_end =
            window_start + duration_from_secs_f64(interval + READING_WINDOW_SLACK_SECONDS);

        sorted
            .into_iter()
            .filter(|r| r.date >= window_start && r.date <= window_end)
            .collect()
    }

    pub fn json_dictionary(&self) -> Value {
        let mut dict = Map::new();
        if let Some(identifier) = &self.model_identifier {
            dict.insert(
                "activityPredictionModelIdentifier".to_string(),
                Value::String(identifier.clone()),
            );
        }
        dict.insert(
            "startDate".to_string(),
            Value::String(ms_json_date_string(self.start_date)),
        );
        dict.insert(
            "predictedActivities".to_string(),
            Value::Array(
                self.predicted_activities
                    .iter()
                    .map(PredictedActivity::json_dictionary)
                    .collect(),
            ),
        );
        Value::Object(dict)
    }
}

/// Combines successive predictions for a route into one verdict.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionAggregator {
    #[serde(default)]
    pub route_uuid: Option<String>,
    #[serde(default)]
    pub accelerometer_readings: Vec<AccelerometerReading>,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    #[serde(default)]
    pub aggregate_predicted_activity: Option<PredictedActivity>,
}

impl PredictionAggregator {
    pub const HIGH_CONFIDENCE: f64 = 0.75;
    pub const SAMPLE_OFFSET_SECONDS: f64 = 0.25;
    pub const MINIMUM_SAMPLE_COUNT_FOR_SUCCESS: usize = 8;
    pub const MAXIMUM_SAMPLE_BEFORE_FAILURE: usize = 15;

    pub fn new(route_uuid: Option<String>) -> Self {
        Self {
            route_uuid,
            ..Self::default()
        }
    }

    pub fn add_unknown_type_prediction(&mut self, start_date: DateTime<Utc>) {
        let mut prediction = Prediction::new(start_date);
        prediction.add_unknown_type_predicted_activity();
        self.predictions.push(prediction);
    }

    /// Recompute the aggregate by summing confidences per class.
    ///
    /// The class with the highest total wins, with its mean confidence across
    /// all predictions. Ties go to the lowest raw activity type.
    pub fn update_aggregate_predicted_activity(&mut self) {
        let mut votes: BTreeMap<ActivityType, f64> = BTreeMap::new();
        for prediction in &self.predictions {
            for predicted in &prediction.predicted_activities {
                *votes.entry(predicted.activity_type).or_default() += predicted.confidence;
            }
        }

        let mut aggregate = PredictedActivity::default();
        let mut top_vote = 0.0;
        for (activity_type, vote) in votes {
            if vote > top_vote {
                aggregate.activity_type = activity_type;
                aggregate.confidence = vote / self.predictions.len() as f64;
                top_vote = vote;
            }
        }

        self.aggregate_predicted_activity = Some(aggregate);
    }

    pub fn is_complete(&self) -> bool {
        let count = self.predictions.len();
        if count <= Self::MINIMUM_SAMPLE_COUNT_FOR_SUCCESS {
            return false;
        }
        if self
            .aggregate_predicted_activity
            .is_some_and(|a| a.confidence > Self::HIGH_CONFIDENCE)
        {
            return true;
        }
        count >= Self::MAXIMUM_SAMPLE_BEFORE_FAILURE
    }

    pub fn first_reading_after(&self, date: DateTime<Utc>) -> Option<&AccelerometerReading> {
        self.accelerometer_readings
            .iter()
            .filter(|r| r.date >= date)
            .min_by_key(|r| r.date)
    }

    pub fn last_reading(&self) -> Option<&AccelerometerReading> {
        self.accelerometer_readings.iter().max_by_key(|r| r.date)
    }

    pub fn first_prediction(&self) -> Option<&Prediction> {
        self.predictions.iter().min_by_key(|p| p.start_date)
    }

    /// JSON projection. Locations come from the owning route.
    pub fn json_dictionary(&self, route_locations: &[Location]) -> Value {
        let mut dict = Map::new();
        if let Some(uuid) = &self.route_uuid {
            dict.insert("routeUUID".to_string(), Value::String(uuid.clone()));
        }
        dict.insert(
            "accelerometerReadings".to_string(),
            Value::Array(
                self.accelerometer_readings
                    .iter()
                    .map(AccelerometerReading::json_dictionary)
                    .collect(),
            ),
        );
        dict.insert(
            "predictions".to_string(),
            Value::Array(self.predictions.iter().map(Prediction::json_dictionary).collect()),
        );
        if let Some(aggregate) = &self.aggregate_predicted_activity {
            dict.insert(
                "aggregatePredictedActivity".to_string(),
                aggregate.json_dictionary(),
            );
        }
        dict.insert(
            "locations".to_string(),
            Value::Array(route_locations.iter().map(Location::json_dictionary).collect()),
        );
        Value::Object(dict)
    }

    /// Parse an uploaded aggregator. Predictions carry `startDate` and
    /// `predictedActivities`; the aggregate is recomputed rather than trusted.
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        if !value.is_object() {
            return Err(ModelError::WrongShape("object"));
        }

        let mut aggregator = Self::new(
            value
                .get("routeUUID")
                .and_then(Value::as_str)
                .map(str::to_string),
        );
        aggregator.accelerometer_readings =
            parse_list(value, "accelerometerReadings", AccelerometerReading::from_json)?;
        aggregator.predictions = parse_list(value, "predictions", |p| {
            let raw = crate::models::json_str(p, "startDate")?;
            let start_date = crate::time_utils::parse_json_date(raw)
                .ok_or_else(|| ModelError::InvalidDate(raw.to_string()))?;
            Ok(Prediction {
                start_date,
                model_identifier: p
                    .get("activityPredictionModelIdentifier")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                predicted_activities: parse_list(
                    p,
                    "predictedActivities",
                    PredictedActivity::from_json,
                )?,
            })
        })?;
        if !aggregator.predictions.is_empty() {
            aggregator.update_aggregate_predicted_activity();
        }
        Ok(aggregator)
    }
}
