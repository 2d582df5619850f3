// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provisional trips awaiting classification.

use crate::models::{Location, LocationSource, MotionActivity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A trip candidate. Its locations and activities move to a real trip once
/// the candidate is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototrip {
    pub id: String,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub battery_at_start: Option<i16>,
    #[serde(default)]
    pub activities: Vec<MotionActivity>,
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl Prototrip {
    pub fn new(creation_date: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            creation_date,
            battery_at_start: None,
            activities: Vec::new(),
            locations: Vec::new(),
        }
    }

    pub fn first_non_geofenced_location(&self) -> Option<&Location> {
        self.locations
            .iter()
            .filter(|loc| loc.source != LocationSource::Geofence)
            .min_by_key(|loc| loc.date)
    }
}
