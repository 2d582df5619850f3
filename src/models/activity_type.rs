// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Classified mode of travel.

use serde::{Deserialize, Serialize};

/// Mode of travel, stored and transmitted as its raw integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum ActivityType {
    #[default]
    Unknown = 0,
    Running = 1,
    Cycling = 2,
    Automotive = 3,
    Walking = 4,
    Bus = 5,
    Rail = 6,
    Stationary = 7,
    Aviation = 8,
}

impl ActivityType {
    /// Every type in raw-value order.
    pub const ALL: [ActivityType; 9] = [
        ActivityType::Unknown,
        ActivityType::Running,
        ActivityType::Cycling,
        ActivityType::Automotive,
        ActivityType::Walking,
        ActivityType::Bus,
        ActivityType::Rail,
        ActivityType::Stationary,
        ActivityType::Aviation,
    ];

    pub fn raw(self) -> i16 {
        self as i16
    }

    pub fn is_motorized(self) -> bool {
        matches!(
            self,
            ActivityType::Automotive | ActivityType::Bus | ActivityType::Rail
        )
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ActivityType::Unknown => "❓",
            ActivityType::Running => "🏃",
            ActivityType::Cycling => "🚲",
            ActivityType::Automotive => "🚗",
            ActivityType::Walking => "🚶",
            ActivityType::Bus => "🚌",
            ActivityType::Rail => "🚈",
            ActivityType::Stationary => "💤",
            ActivityType::Aviation => "✈️",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            ActivityType::Unknown => "Unknown",
            ActivityType::Running => "Run",
            ActivityType::Cycling => "Bike Ride",
            ActivityType::Automotive => "Drive",
            ActivityType::Walking => "Walk",
            ActivityType::Bus => "Bus Ride",
            ActivityType::Rail => "Train Ride",
            ActivityType::Stationary => "Sitting",
            ActivityType::Aviation => "Flight",
        }
    }
}

impl From<i16> for ActivityType {
    fn from(raw: i16) -> Self {
        ActivityType::ALL
            .into_iter()
            .find(|t| t.raw() == raw)
            .unwrap_or(ActivityType::Unknown)
    }
}

impl From<ActivityType> for i16 {
    fn from(value: ActivityType) -> Self {
        value.raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_values_round_trip_and_unknown_fallback() {
        for t in ActivityType::ALL {
            assert_eq!(ActivityType::from(t.raw()), t);
        }
        assert_eq!(ActivityType::from(42), ActivityType::Unknown);
        assert_eq!(ActivityType::from(-1), ActivityType::Unknown);
    }

    #[test]
    fn test_motorized() {
        let motorized: Vec<_> = ActivityType::ALL
            .into_iter()
            .filter(|t| t.is_motorized())
            .collect();
        assert_eq!(
            motorized,
            vec![ActivityType::Automotive, ActivityType::Bus, ActivityType::Rail]
        );
    }

    #[test]
    fn test_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&ActivityType::Cycling).unwrap(), "2");
        let parsed: ActivityType = serde_json::from_str("6").unwrap();
        assert_eq!(parsed, ActivityType::Rail);
        assert_eq!(parsed.noun(), "Train Ride");
    }
}
