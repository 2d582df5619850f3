// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ride statistics aggregates for the stats dashboard.
//!
//! Computed from the rider's trips in one pass, so the dashboard needs a
//! single query instead of one count query per figure.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{ActivityType, RatingChoice, Trip};
use crate::time_utils::format_utc_rfc3339;

/// Trips older than this are excluded from the "last 30 days" counts.
const RECENT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongestTrip {
    pub uuid: String,
    pub length_meters: f64,
    pub start_date: String,
}

/// Dashboard statistics for a rider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RideStats {
    // ─── Totals ──────────────────────────────────────────────────
    /// All trips of any type
    #[serde(default)]
    pub total_trips: u32,
    /// Trip count per activity noun ("Bike Ride", "Drive", ...)
    #[serde(default)]
    pub trips_by_activity: BTreeMap<String, u32>,

    // ─── Bike Rides ──────────────────────────────────────────────
    #[serde(default)]
    pub bike_trips_count: u32,
    /// Meters
    #[serde(default)]
    pub bike_total_distance: f64,
    /// Bike trips with any rating
    #[serde(default)]
    pub rated_trips_count: u32,
    #[serde(default)]
    pub good_trips_count: u32,
    #[serde(default)]
    pub bad_trips_count: u32,
    #[serde(default)]
    pub longest_bike_trip: Option<LongestTrip>,

    // ─── Mode Share ──────────────────────────────────────────────
    #[serde(default)]
    pub cycled_trips_count: u32,
    #[serde(default)]
    pub automotive_trips_count: u32,
    #[serde(default)]
    pub bus_trips_count: u32,
    #[serde(default)]
    pub cycled_trips_last_30_days: u32,
    #[serde(default)]
    pub automotive_trips_last_30_days: u32,
    #[serde(default)]
    pub bus_trips_last_30_days: u32,

    // ─── Time Series ─────────────────────────────────────────────
    /// Bike trip count per month ("YYYY-MM" format)
    #[serde(default)]
    pub bike_trips_by_month: BTreeMap<String, u32>,
    /// Bike trip count per year ("YYYY" format)
    #[serde(default)]
    pub bike_trips_by_year: BTreeMap<String, u32>,

    // ─── Metadata ────────────────────────────────────────────────
    /// Computation timestamp (RFC 3339)
    #[serde(default)]
    pub updated_at: String,
}

impl RideStats {
    pub fn from_trips<'a, I>(trips: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a Trip>,
    {
        let mut stats = Self {
            updated_at: format_utc_rfc3339(now),
            ..Self::default()
        };
        let recent_cutoff = now - Duration::days(RECENT_WINDOW_DAYS);
        for trip in trips {
            stats.add_trip(trip, trip.start_date > recent_cutoff);
        }
        stats
    }

    fn add_trip(&mut self, trip: &Trip, is_recent: bool) {
        self.total_trips += 1;
        *self
            .trips_by_activity
            .entry(trip.activity_type.noun().to_string())
            .or_insert(0) += 1;

        match trip.activity_type {
            ActivityType::Automotive => {
                self.automotive_trips_count += 1;
                self.automotive_trips_last_30_days += u32::from(is_recent);
            }
            ActivityType::Bus => {
                self.bus_trips_count += 1;
                self.bus_trips_last_30_days += u32::from(is_recent);
            }
            ActivityType::Cycling => {
                self.cycled_trips_count += 1;
                self.cycled_trips_last_30_days += u32::from(is_recent);
                self.add_bike_trip(trip);
            }
            _ => {}
        }
    }

    fn add_bike_trip(&mut self, trip: &Trip) {
        self.bike_trips_count += 1;
        self.bike_total_distance += trip.length;

        match trip.rating.choice {
            RatingChoice::NotSet => {}
            RatingChoice::Good => {
                self.rated_trips_count += 1;
                self.good_trips_count += 1;
            }
            RatingChoice::Bad => {
                self.rated_trips_count += 1;
                self.bad_trips_count += 1;
            }
            RatingChoice::Mixed => self.rated_trips_count += 1,
        }

        let is_longer = self
            .longest_bike_trip
            .as_ref()
            .map_or(true, |longest| trip.length > longest.length_meters);
        if is_longer {
            self.longest_bike_trip = Some(LongestTrip {
                uuid: trip.uuid.clone(),
                length_meters: trip.length,
                start_date: format_utc_rfc3339(trip.start_date),
            });
        }

        *self
            .bike_trips_by_month
            .entry(trip.start_date.format("%Y-%m").to_string())
            .or_insert(0) += 1;
        *self
            .bike_trips_by_year
            .entry(trip.start_date.format("%Y").to_string())
            .or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Rating, RatingVersion};
    use chrono::TimeZone;

    fn make_trip(uuid: &str, activity: ActivityType, start: DateTime<Utc>, length: f64) -> Trip {
        let mut trip = Trip::new(uuid, start);
        trip.activity_type = activity;
        trip.length = length;
        trip
    }

    #[test]
    fn test_from_trips_counts() {
        let now = Utc.with_ymd_and_hms(2017, 6, 30, 12, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2017, 6, 20, 8, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2016, 12, 1, 8, 0, 0).unwrap();

        let mut good = make_trip("a", ActivityType::Cycling, recent, 5000.0);
        good.rating = Rating::new(RatingChoice::Good, RatingVersion::V1);
        let mut bad = make_trip("b", ActivityType::Cycling, old, 12000.0);
        bad.rating = Rating::new(RatingChoice::Bad, RatingVersion::V1);
        let trips = vec![
            good,
            bad,
            make_trip("c", ActivityType::Automotive, recent, 20000.0),
            make_trip("d", ActivityType::Bus, old, 3000.0),
            make_trip("e", ActivityType::Walking, recent, 800.0),
        ];

        let stats = RideStats::from_trips(&trips, now);

        assert_eq!(stats.total_trips, 5);
        assert_eq!(stats.bike_trips_count, 2);
        assert_eq!(stats.bike_total_distance, 17000.0);
        assert_eq!(stats.rated_trips_count, 2);
        assert_eq!(stats.good_trips_count, 1);
        assert_eq!(stats.bad_trips_count, 1);
        assert_eq!(stats.cycled_trips_last_30_days, 1);
        assert_eq!(stats.automotive_trips_last_30_days, 1);
        assert_eq!(stats.bus_trips_count, 1);
        assert_eq!(stats.bus_trips_last_30_days, 0);
        assert_eq!(stats.trips_by_activity.get("Walk"), Some(&1));
        assert_eq!(stats.bike_trips_by_month.get("2016-12"), Some(&1));
        assert_eq!(stats.bike_trips_by_year.get("2017"), Some(&1));
        assert_eq!(stats.longest_bike_trip.as_ref().map(|t| t.uuid.as_str()), Some("b"));
        assert_eq!(stats.updated_at, "2017-06-30T12:00:00Z");
    }

    #[test]
    fn test_empty_and_missing_fields_deserialize() {
        let stats = RideStats::from_trips(std::iter::empty::<&Trip>(), Utc::now());
        assert_eq!(stats.total_trips, 0);
        assert!(stats.longest_bike_trip.is_none());

        let parsed: RideStats = serde_json::from_str(r#"{"total_trips": 3}"#).unwrap();
        assert_eq!(parsed.total_trips, 3);
        assert!(parsed.bike_trips_by_month.is_empty());
    }
}
