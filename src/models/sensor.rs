// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Raw motion sensor samples and the collections that group them.

use crate::models::location::{ACCEPTABLE_LOCATION_ACCURACY, MINIMUM_MOVING_SPEED};
use crate::models::prediction::PredictedActivity;
use crate::models::{json_f64, json_str, ActivityType, Location, ModelError};
use crate::time_utils::{duration_from_secs_f64, ms_json_date_string, parse_json_date};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Classifier output attached to a sensor collection.
pub type ActivityTypePrediction = PredictedActivity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    AccelerometerAcceleration,
    GyroscopeRotationRate,
    DeviceMotionAcceleration,
    DeviceMotionRotationRate,
}

/// One three-axis sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub date: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Accelerometer samples used by prediction aggregators share the reading shape.
pub type AccelerometerReading = SensorReading;

impl SensorReading {
    pub fn json_dictionary(&self) -> Value {
        json!({
            "date": ms_json_date_string(self.date),
            "x": self.x,
            "y": self.y,
            "z": self.z,
        })
    }

    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let raw = json_str(value, "date")?;
        Ok(Self {
            date: parse_json_date(raw).ok_or_else(|| ModelError::InvalidDate(raw.to_string()))?,
            x: json_f64(value, "x")?,
            y: json_f64(value, "y")?,
            z: json_f64(value, "z")?,
        })
    }
}

/// Converts monotonic sensor timestamps (seconds since boot) into wall-clock dates.
///
/// The first sample fixes the boot reference; later samples are offset from it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BootClock {
    reference: Option<DateTime<Utc>>,
}

impl BootClock {
    pub fn date_for(&mut self, timestamp: f64, now: DateTime<Utc>) -> DateTime<Utc> {
        let reference = *self
            .reference
            .get_or_insert_with(|| now - duration_from_secs_f64(timestamp));
        reference + duration_from_secs_f64(timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMotion {
    pub date: DateTime<Utc>,
    pub gravity_x: f64,
    pub gravity_y: f64,
    pub gravity_z: f64,
    pub user_acceleration_x: f64,
    pub user_acceleration_y: f64,
    pub user_acceleration_z: f64,
}

impl DeviceMotion {
    pub fn json_dictionary(&self) -> Value {
        json!({
            "date": ms_json_date_string(self.date),
            "gravityX": self.gravity_x,
            "gravityY": self.gravity_y,
            "gravityZ": self.gravity_z,
            "userAccelerationX": self.user_acceleration_x,
            "userAccelerationY": self.user_acceleration_y,
            "userAccelerationZ": self.user_acceleration_z,
        })
    }
}

/// A run of device-motion samples. Its JSON projection is a bare array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMotionsSample {
    pub motions: Vec<DeviceMotion>,
    #[serde(skip)]
    clock: BootClock,
}

impl DeviceMotionsSample {
    pub fn add_device_motion(
        &mut self,
        timestamp: f64,
        gravity: [f64; 3],
        user_acceleration: [f64; 3],
        now: DateTime<Utc>,
    ) {
        let date = self.clock.date_for(timestamp, now);
        self.motions.push(DeviceMotion {
            date,
            gravity_x: gravity[0],
            gravity_y: gravity[1],
            gravity_z: gravity[2],
            user_acceleration_x: user_acceleration[0],
            user_acceleration_y: user_acceleration[1],
            user_acceleration_z: user_acceleration[2],
        });
    }

    pub fn json_dictionary(&self) -> Value {
        Value::Array(self.motions.iter().map(DeviceMotion::json_dictionary).collect())
    }
}

/// Record that owns a sensor collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CollectionOwner {
    Prototrip(String),
    Trip(String),
}

impl CollectionOwner {
    pub fn id(&self) -> &str {
        match self {
            CollectionOwner::Prototrip(id) | CollectionOwner::Trip(id) => id,
        }
    }
}

/// A batch of raw samples captured for one trip or trip candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDataCollection {
    pub id: String,
    pub owner: CollectionOwner,
    #[serde(default)]
    pub activity_prediction_model_identifier: Option<String>,
    #[serde(default)]
    pub accelerometer_accelerations: Vec<SensorReading>,
    #[serde(default)]
    pub gyroscope_rotation_rates: Vec<SensorReading>,
    #[serde(default)]
    pub device_motion_accelerations: Vec<SensorReading>,
    #[serde(default)]
    pub device_motion_rotation_rates: Vec<SensorReading>,
    #[serde(default)]
    pub activity_type_predictions: Vec<ActivityTypePrediction>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(skip)]
    clock: BootClock,
}

impl SensorDataCollection {
    pub fn new(owner: CollectionOwner) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner,
            activity_prediction_model_identifier: None,
            accelerometer_accelerations: Vec::new(),
            gyroscope_rotation_rates: Vec::new(),
            device_motion_accelerations: Vec::new(),
            device_motion_rotation_rates: Vec::new(),
            activity_type_predictions: Vec::new(),
            locations: Vec::new(),
            clock: BootClock::default(),
        }
    }

    /// Append a sample, dating it against the collection's boot reference.
    pub fn add_reading(
        &mut self,
        kind: SensorKind,
        timestamp: f64,
        values: [f64; 3],
        now: DateTime<Utc>,
    ) {
        let reading = SensorReading {
            date: self.clock.date_for(timestamp, now),
            x: values[0],
            y: values[1],
            z: values[2],
        };
        self.readings_mut(kind).push(reading);
    }

    pub fn readings(&self, kind: SensorKind) -> &[SensorReading] {
        match kind {
            SensorKind::AccelerometerAcceleration => &self.accelerometer_accelerations,
            SensorKind::GyroscopeRotationRate => &self.gyroscope_rotation_rates,
            SensorKind::DeviceMotionAcceleration => &self.device_motion_accelerations,
            SensorKind::DeviceMotionRotationRate => &self.device_motion_rotation_rates,
        }
    }

    fn readings_mut(&mut self, kind: SensorKind) -> &mut Vec<SensorReading> {
        match kind {
            SensorKind::AccelerometerAcceleration => &mut self.accelerometer_accelerations,
            SensorKind::GyroscopeRotationRate => &mut self.gyroscope_rotation_rates,
            SensorKind::DeviceMotionAcceleration => &mut self.device_motion_accelerations,
            SensorKind::DeviceMotionRotationRate => &mut self.device_motion_rotation_rates,
        }
    }

    /// Keep a fix only if it is accurate and carries a valid speed.
    pub fn add_location_if_sufficiently_accurate(&mut self, location: Location) -> bool {
        if location.horizontal_accuracy > ACCEPTABLE_LOCATION_ACCURACY || location.speed < 0.0 {
            return false;
        }
        self.locations.push(location);
        true
    }

    pub fn add_unknown_type_prediction(&mut self) {
        self.activity_type_predictions
            .push(PredictedActivity::new(ActivityType::Unknown, 1.0));
    }

    /// Replace predictions with the classifier's per-class confidences.
    pub fn set_activity_type_predictions(&mut self, class_confidences: &BTreeMap<ActivityType, f64>) {
        self.activity_type_predictions = class_confidences
            .iter()
            .map(|(&activity_type, &confidence)| PredictedActivity::new(activity_type, confidence))
            .collect();
    }

    /// Highest-confidence prediction, ignoring zero-confidence entries.
    pub fn top_activity_type_prediction(&self) -> Option<&ActivityTypePrediction> {
        let mut top: Option<&ActivityTypePrediction> = None;
        for prediction in &self.activity_type_predictions {
            let high_score = top.map_or(0.0, |p| p.confidence);
            if prediction.confidence > high_score {
                top = Some(prediction);
            }
        }
        top
    }

    /// Mean speed over accurate fixes that show movement, or -1 if there are none.
    pub fn average_moving_speed(&self) -> f64 {
        self.average_speed_where(|loc| loc.speed >= MINIMUM_MOVING_SPEED)
    }

    /// Mean speed over accurate fixes with a valid speed, or -1 if there are none.
    pub fn average_speed(&self) -> f64 {
        self.average_speed_where(|loc| loc.speed >= 0.0)
    }

    fn average_speed_where(&self, include: impl Fn(&Location) -> bool) -> f64 {
        let speeds: Vec<f64> = self
            .locations
            .iter()
            .filter(|loc| include(loc) && loc.horizontal_accuracy <= ACCEPTABLE_LOCATION_ACCURACY)
            .map(|loc| loc.speed)
            .collect();

        if speeds.is_empty() {
            return -1.0;
        }
        speeds.iter().sum::<f64>() / speeds.len() as f64
    }

    pub fn json_dictionary(&self) -> Value {
        let mut dict = Map::new();
        dict.insert(
            "accelerometerAccelerations".to_string(),
            readings_json(&self.accelerometer_accelerations),
        );
        dict.insert(
            "gyroscopeRotationsRates".to_string(),
            readings_json(&self.gyroscope_rotation_rates),
        );
        if let Some(identifier) = &self.activity_prediction_model_identifier {
            dict.insert(
                "activityPredictionModelIdentifier".to_string(),
                Value::String(identifier.clone()),
            );
        }
        dict.insert(
            "locations".to_string(),
            Value::Array(self.locations.iter().map(Location::json_dictionary).collect()),
        );
        dict.insert(
            "activityTypePredictions".to_string(),
            Value::Array(
                self.activity_type_predictions
                    .iter()
                    .map(PredictedActivity::json_dictionary)
                    .collect(),
            ),
        );
        Value::Object(dict)
    }

    /// Parse an uploaded collection. Absent arrays are treated as empty.
    pub fn from_json(value: &Value, owner: CollectionOwner) -> Result<Self, ModelError> {
        if !value.is_object() {
            return Err(ModelError::WrongShape("object"));
        }

        let mut collection = Self::new(owner);
        collection.activity_prediction_model_identifier = value
            .get("activityPredictionModelIdentifier")
            .and_then(Value::as_str)
            .map(str::to_string);
        collection.accelerometer_accelerations =
            parse_list(value, "accelerometerAccelerations", SensorReading::from_json)?;
        collection.gyroscope_rotation_rates =
            parse_list(value, "gyroscopeRotationsRates", SensorReading::from_json)?;
        collection.locations = parse_list(value, "locations", Location::from_json)?;
        collection.activity_type_predictions =
            parse_list(value, "activityTypePredictions", PredictedActivity::from_json)?;
        Ok(collection)
    }

    pub fn debug_description(&self) -> String {
        let predictions: String = self
            .activity_type_predictions
            .iter()
            .map(|p| format!("{}, ", p.debug_description()))
            .collect();
        format!(
            "Readings: {} Moving Speed: {}, {}",
            self.accelerometer_accelerations.len(),
            self.average_moving_speed(),
            predictions
        )
    }
}

fn readings_json(readings: &[SensorReading]) -> Value {
    Value::Array(readings.iter().map(SensorReading::json_dictionary).collect())
}

pub(crate) fn parse_list<T>(
    value: &Value,
    key: &'static str,
    parse: impl Fn(&Value) -> Result<T, ModelError>,
) -> Result<Vec<T>, ModelError> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(parse).collect(),
        Some(_) => Err(ModelError::MissingField(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationSource;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 3, 14, 12, 0, 0).unwrap()
    }

    fn make_location(speed: f64, accuracy: f64) -> Location {
        Location {
            date: now(),
            latitude: 45.5,
            longitude: -122.6,
            altitude: 0.0,
            course: 0.0,
            speed,
            horizontal_accuracy: accuracy,
            vertical_accuracy: 0.0,
            source: LocationSource::ActiveGps,
        }
    }

    #[test]
    fn test_reading_json_shape() {
        let reading = SensorReading {
            date: now(),
            x: 0.25,
            y: -1.0,
            z: 9.81,
        };
        let dict = reading.json_dictionary();

        assert_eq!(dict["date"], "2017-03-14 12:00:00.000+0000");
        assert_eq!(dict["x"], 0.25);
        assert_eq!(dict["y"], -1.0);
        assert_eq!(dict["z"], 9.81);
        assert_eq!(dict.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_boot_clock_offsets_from_first_sample() {
        let mut collection = SensorDataCollection::new(CollectionOwner::Trip("t1".into()));
        collection.add_reading(SensorKind::AccelerometerAcceleration, 100.0, [0.0; 3], now());
        // A later wall clock must not move the reference.
        collection.add_reading(
            SensorKind::AccelerometerAcceleration,
            100.5,
            [0.0; 3],
            now() + chrono::Duration::seconds(30),
        );

        let readings = collection.readings(SensorKind::AccelerometerAcceleration);
        assert_eq!(readings[0].date, now());
        assert_eq!(readings[1].date, now() + chrono::Duration::milliseconds(500));
    }

    #[test]
    fn test_top_prediction_ignores_zero_confidence() {
        let mut collection = SensorDataCollection::new(CollectionOwner::Trip("t1".into()));
        assert!(collection.top_activity_type_prediction().is_none());

        let mut confidences = BTreeMap::new();
        confidences.insert(ActivityType::Walking, 0.0);
        collection.set_activity_type_predictions(&confidences);
        assert!(collection.top_activity_type_prediction().is_none());

        confidences.insert(ActivityType::Cycling, 0.7);
        confidences.insert(ActivityType::Automotive, 0.2);
        collection.set_activity_type_predictions(&confidences);
        let top = collection.top_activity_type_prediction().unwrap();
        assert_eq!(top.activity_type, ActivityType::Cycling);
        assert_eq!(collection.activity_type_predictions.len(), 3);
    }

    #[test]
    fn test_average_speeds() {
        let mut collection = SensorDataCollection::new(CollectionOwner::Trip("t1".into()));
        assert_eq!(collection.average_speed(), -1.0);

        collection.locations.push(make_location(0.1, 5.0));
        collection.locations.push(make_location(4.0, 10.0));
        collection.locations.push(make_location(8.0, 50.0));

        assert_eq!(collection.average_moving_speed(), 4.0);
        assert!((collection.average_speed() - 2.05).abs() < 1e-9);
    }

    #[test]
    fn test_add_location_filters_inaccurate_fixes() {
        let mut collection = SensorDataCollection::new(CollectionOwner::Trip("t1".into()));
        assert!(!collection.add_location_if_sufficiently_accurate(make_location(3.0, 31.0)));
        assert!(!collection.add_location_if_sufficiently_accurate(make_location(-1.0, 5.0)));
        assert!(collection.add_location_if_sufficiently_accurate(make_location(3.0, 30.0)));
        assert_eq!(collection.locations.len(), 1);
    }

    #[test]
    fn test_collection_json_keys() {
        let mut collection = SensorDataCollection::new(CollectionOwner::Trip("t1".into()));
        collection.add_reading(SensorKind::GyroscopeRotationRate, 1.0, [1.0, 2.0, 3.0], now());
        collection.add_reading(SensorKind::DeviceMotionAcceleration, 1.0, [0.0; 3], now());
        collection.add_unknown_type_prediction();

        let dict = collection.json_dictionary();
        let keys: Vec<&String> = dict.as_object().unwrap().keys().collect();
        assert!(!keys.iter().any(|k| *k == "activityPredictionModelIdentifier"));
        assert_eq!(dict["gyroscopeRotationsRates"][0]["z"], 3.0);
        assert_eq!(dict["accelerometerAccelerations"], json!([]));
        assert_eq!(
            dict["activityTypePredictions"],
            json!([{"activityType": 0, "confidence": 1.0}])
        );

        collection.activity_prediction_model_identifier = Some("rf-2017-02".into());
        assert_eq!(
            collection.json_dictionary()["activityPredictionModelIdentifier"],
            "rf-2017-02"
        );
    }

    #[test]
    fn test_collection_from_json() {
        let value = json!({
            "activityPredictionModelIdentifier": "rf-1",
            "accelerometerAccelerations": [
                {"date": "2017-03-14 12:00:00.250+0000", "x": 0.1, "y": 0.2, "z": 0.3}
            ],
            "activityTypePredictions": [{"activityType": 2, "confidence": 0.9}]
        });

        let collection =
            SensorDataCollection::from_json(&value, CollectionOwner::Trip("t2".into())).unwrap();
        assert_eq!(collection.accelerometer_accelerations.len(), 1);
        assert!(collection.gyroscope_rotation_rates.is_empty());
        assert_eq!(collection.owner.id(), "t2");
        assert_eq!(
            collection.top_activity_type_prediction().unwrap().activity_type,
            ActivityType::Cycling
        );

        let bad = json!({"accelerometerAccelerations": [{"x": 1.0}]});
        assert!(SensorDataCollection::from_json(&bad, CollectionOwner::Trip("t2".into())).is_err());
    }

    #[test]
    fn test_device_motions_sample_is_array() {
        let mut sample = DeviceMotionsSample::default();
        sample.add_device_motion(5.0, [0.0, 0.0, -1.0], [0.1, 0.2, 0.3], now());
        let json = sample.json_dictionary();

        assert!(json.is_array());
        assert_eq!(json[0]["gravityZ"], -1.0);
        assert_eq!(json[0]["userAccelerationY"], 0.2);
        assert_eq!(json[0]["date"], "2017-03-14 12:00:00.000+0000");
    }
}
