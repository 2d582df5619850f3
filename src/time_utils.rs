// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.
//!
//! Two wire formats are in use: the second-resolution JSON date
//! (`2016-05-03 14:02:17+0000`) and the millisecond variant
//! (`2016-05-03 14:02:17.120+0000`) used by sensor and location payloads.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

const JSON_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";
const MS_JSON_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f%z";

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a date as a second-resolution JSON date string.
pub fn json_date_string(date: DateTime<Utc>) -> String {
    date.format(JSON_DATE_FORMAT).to_string()
}

/// Format a date as a millisecond-resolution JSON date string.
pub fn ms_json_date_string(date: DateTime<Utc>) -> String {
    date.format(MS_JSON_DATE_FORMAT).to_string()
}

/// Parse either JSON date form. Returns `None` for anything else.
pub fn parse_json_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, MS_JSON_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_str(raw, JSON_DATE_FORMAT))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert fractional seconds to a chrono duration with microsecond precision.
pub fn duration_from_secs_f64(seconds: f64) -> Duration {
    Duration::microseconds((seconds * 1_000_000.0).round() as i64)
}

/// Render a duration in seconds as `HH:MM`, rounding minutes up.
pub fn interval_string(seconds: f64) -> String {
    let minutes = (seconds / 60.0).ceil() % 60.0;
    let hours = seconds as i64 / 3600;
    format!("{:02}:{:02.0}", hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_json_date_formats() {
        let date = Utc.with_ymd_and_hms(2016, 5, 3, 14, 2, 17).unwrap()
            + chrono::Duration::milliseconds(120);

        assert_eq!(json_date_string(date), "2016-05-03 14:02:17+0000");
        assert_eq!(ms_json_date_string(date), "2016-05-03 14:02:17.120+0000");
    }

    #[test]
    fn test_parse_json_date_accepts_both_forms() {
        let with_ms = parse_json_date("2016-05-03 14:02:17.120+0000").unwrap();
        assert_eq!(with_ms.timestamp_subsec_millis(), 120);

        let without_ms = parse_json_date("2016-05-03 07:02:17-0700").unwrap();
        assert_eq!(
            without_ms,
            Utc.with_ymd_and_hms(2016, 5, 3, 14, 2, 17).unwrap()
        );

        assert!(parse_json_date("2016-05-03T14:02:17Z").is_none());
        assert!(parse_json_date("").is_none());
    }

    #[test]
    fn test_interval_string() {
        assert_eq!(interval_string(0.0), "00:00");
        assert_eq!(interval_string(61.0), "00:02");
        assert_eq!(interval_string(3600.0), "01:00");
        assert_eq!(interval_string(2.0 * 3600.0 + 15.0 * 60.0), "02:15");
    }
}
