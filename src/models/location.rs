// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recorded positions and where they came from.

use crate::models::{json_f64, json_str, ModelError};
use crate::time_utils::{ms_json_date_string, parse_json_date};
use chrono::{DateTime, Utc};
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Below this speed (m/s) a fix is not considered movement.
pub const MINIMUM_MOVING_SPEED: f64 = 0.2;
/// Fixes with a worse horizontal accuracy (m) are discarded.
pub const ACCEPTABLE_LOCATION_ACCURACY: f64 = 30.0;

/// Padding applied to a search radius before the bounding-box prefilter.
const SEARCH_RADIUS_PADDING: f64 = 1.1;
const EARTH_RADIUS_METERS: f64 = 6_371_009.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum LocationSource {
    #[default]
    Unknown = 0,
    ActiveGps = 1,
    Passive = 2,
    Geofence = 3,
    VisitArrival = 4,
    VisitDeparture = 5,
    LastRouteArrival = 6,
}

impl LocationSource {
    pub fn raw(self) -> i16 {
        self as i16
    }

    /// Inferred sources are positions we did not observe directly with GPS.
    pub fn is_inferred(self) -> bool {
        !matches!(self, LocationSource::ActiveGps | LocationSource::Passive)
    }

    pub fn description(self) -> &'static str {
        match self {
            LocationSource::Unknown => "Unknown",
            LocationSource::ActiveGps => "Active GPS",
            LocationSource::Passive => "Passive",
            LocationSource::Geofence => "Geofence",
            LocationSource::VisitArrival => "Visit Arrival",
            LocationSource::VisitDeparture => "Visit Departure",
            LocationSource::LastRouteArrival => "Last Route Arrival",
        }
    }
}

impl From<i16> for LocationSource {
    fn from(raw: i16) -> Self {
        match raw {
            1 => LocationSource::ActiveGps,
            2 => LocationSource::Passive,
            3 => LocationSource::Geofence,
            4 => LocationSource::VisitArrival,
            5 => LocationSource::VisitDeparture,
            6 => LocationSource::LastRouteArrival,
            _ => LocationSource::Unknown,
        }
    }
}

impl From<LocationSource> for i16 {
    fn from(value: LocationSource) -> Self {
        value.raw()
    }
}

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        Haversine.distance(self.point(), other.point())
    }
}

/// Axis-aligned latitude/longitude box used to prefilter spatial lookups.
///
/// Longitude bounds are not normalized: a box near the antimeridian may have
/// `min_longitude < -180` or `max_longitude > 180`, and `contains` tests the
/// wrapped interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Box enclosing a circle of `radius` meters around `center`, padded by 10%.
    pub fn around(center: Coordinate, radius: f64) -> Self {
        let search_radius = radius * SEARCH_RADIUS_PADDING;
        let lat_delta = (search_radius / EARTH_RADIUS_METERS).to_degrees();
        let cos_lat = center.latitude.to_radians().cos().abs().max(f64::EPSILON);
        let lon_delta = (search_radius / (EARTH_RADIUS_METERS * cos_lat))
            .to_degrees()
            .min(180.0);

        Self {
            min_latitude: center.latitude - lat_delta,
            max_latitude: center.latitude + lat_delta,
            min_longitude: center.longitude - lon_delta,
            max_longitude: center.longitude + lon_delta,
        }
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&coordinate.latitude)
            && self.contains_longitude(coordinate.longitude)
    }

    fn contains_longitude(&self, longitude: f64) -> bool {
        let range = self.min_longitude..=self.max_longitude;
        range.contains(&longitude)
            || (self.min_longitude < -180.0 && range.contains(&(longitude - 360.0)))
            || (self.max_longitude > 180.0 && range.contains(&(longitude + 360.0)))
    }
}

/// A single position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub date: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub course: f64,
    pub speed: f64,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
    #[serde(default)]
    pub source: LocationSource,
}

impl Location {
    /// Location synthesized from a visit event. Course and speed are unknown.
    pub fn from_visit(
        coordinate: Coordinate,
        horizontal_accuracy: f64,
        date: DateTime<Utc>,
        is_arriving: bool,
    ) -> Self {
        Self {
            date,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            altitude: 0.0,
            course: -1.0,
            speed: -1.0,
            horizontal_accuracy,
            vertical_accuracy: -1.0,
            source: if is_arriving {
                LocationSource::VisitArrival
            } else {
                LocationSource::VisitDeparture
            },
        }
    }

    /// Copy of the previous route's end, used as a candidate start for the next one.
    pub fn last_arrival_copy(&self) -> Self {
        Self {
            source: LocationSource::LastRouteArrival,
            ..self.clone()
        }
    }

    /// Parse an uploaded location dictionary.
    ///
    /// `date`, `latitude`, `longitude`, `course`, `speed` and `horizontalAccuracy`
    /// are required. Legacy payloads carry `isGeofencedLocation` instead of `source`.
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let date_raw = json_str(value, "date")?;
        let date = parse_json_date(date_raw)
            .ok_or_else(|| ModelError::InvalidDate(date_raw.to_string()))?;

        let source = match value.get("source").and_then(Value::as_i64) {
            Some(raw) => i16::try_from(raw).map_or(LocationSource::Unknown, LocationSource::from),
            None => match value.get("isGeofencedLocation").and_then(Value::as_bool) {
                Some(true) => LocationSource::Geofence,
                Some(false) => LocationSource::ActiveGps,
                None => LocationSource::Unknown,
            },
        };

        Ok(Self {
            date,
            latitude: json_f64(value, "latitude")?,
            longitude: json_f64(value, "longitude")?,
            altitude: value.get("altitude").and_then(Value::as_f64).unwrap_or(0.0),
            course: json_f64(value, "course")?,
            speed: json_f64(value, "speed")?,
            horizontal_accuracy: json_f64(value, "horizontalAccuracy")?,
            vertical_accuracy: value
                .get("verticalAccuracy")
                .and_then(Value::as_f64)
                .unwrap_or(-1.0),
            source,
        })
    }

    pub fn json_dictionary(&self) -> Value {
        json!({
            "date": ms_json_date_string(self.date),
            "horizontalAccuracy": self.horizontal_accuracy,
            "speed": self.speed,
            "longitude": self.longitude,
            "latitude": self.latitude,
            "source": self.source.raw(),
            "course": self.course,
            "altitude": self.altitude,
            "verticalAccuracy": self.vertical_accuracy,
        })
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn distance_to(&self, other: &Location) -> f64 {
        self.coordinate().distance_to(&other.coordinate())
    }

    /// Seconds between `other` and this fix; positive when this one is later.
    pub fn time_interval_since(&self, other: &Location) -> f64 {
        (self.date - other.date).num_milliseconds() as f64 / 1000.0
    }

    pub fn is_sufficiently_accurate(&self) -> bool {
        self.horizontal_accuracy <= ACCEPTABLE_LOCATION_ACCURACY
    }

    pub fn debug_description(&self) -> String {
        format!(
            "{} {:.5}, {:.5} {:.2} m/s",
            self.date, self.longitude, self.latitude, self.speed
        )
    }
}

/// Locations within `radius` meters of `center`.
///
/// Candidates are first narrowed with the padded bounding box, then checked
/// against the exact great-circle distance.
pub fn locations_in_circle<'a, I>(candidates: I, center: Coordinate, radius: f64) -> Vec<Location>
where
    I: IntoIterator<Item = &'a Location>,
{
    let bounds = BoundingBox::around(center, radius);
    candidates
        .into_iter()
        .filter(|loc| bounds.contains(&loc.coordinate()))
        .filter(|loc| loc.coordinate().distance_to(&center) <= radius)
        .cloned()
        .collect()
}
