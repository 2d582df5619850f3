// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Locale-aware formatting of speeds and distances.

use serde::{Deserialize, Serialize};

const METERS_TO_FEET: f64 = 3.2808399;
const METERS_TO_MILES: f64 = 0.000621371;
const MPS_TO_MPH: f64 = 2.23693629;
const MPS_TO_KPH: f64 = 3.6;

/// Below this many meters, metric distances are shown in meters.
const METERS_CUTOFF: f64 = 400.0;
/// Below this many feet, imperial distances are shown in feet.
const FEET_CUTOFF: f64 = 1056.0;

/// Countries that do not use the metric system.
const NON_METRIC_COUNTRIES: [&str; 3] = ["US", "LR", "MM"];

/// The parts of a locale that affect unit formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitLocale {
    pub identifier: String,
    pub language: String,
    pub country_code: Option<String>,
    pub uses_metric: bool,
}

impl Default for UnitLocale {
    fn default() -> Self {
        Self::parse("en_US")
    }
}

impl UnitLocale {
    /// Parse an identifier like `en_US`, `de-DE` or `fr`.
    ///
    /// A locale without a country is treated as metric.
    pub fn parse(identifier: &str) -> Self {
        let base = identifier.split(['.', '@']).next().unwrap_or_default();
        let mut parts = base.split(['_', '-']);
        let language = parts.next().unwrap_or_default().to_ascii_lowercase();
        let country_code = parts
            .find(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic()))
            .map(str::to_ascii_uppercase);
        let uses_metric = country_code
            .as_deref()
            .map_or(true, |country| !NON_METRIC_COUNTRIES.contains(&country));

        Self {
            identifier: identifier.to_string(),
            language,
            country_code,
            uses_metric,
        }
    }

    pub fn is_gb(&self) -> bool {
        self.country_code.as_deref() == Some("GB")
    }

    fn separators(&self) -> (char, char) {
        match self.language.as_str() {
            "de" | "es" | "it" | "nl" | "pt" | "da" | "id" | "tr" => (',', '.'),
            "fr" | "ru" | "sv" | "nb" | "fi" | "pl" | "cs" => (',', ' '),
            _ => ('.', ','),
        }
    }

    /// Decimal number with grouping separators and at most `max_fraction_digits`
    /// fraction digits. Trailing zero fraction digits are dropped.
    pub fn format_decimal(&self, value: f64, max_fraction_digits: usize) -> String {
        let (decimal_sep, group_sep) = self.separators();
        let rendered = format!("{:.*}", max_fraction_digits, value.abs());
        let (integer, fraction) = match rendered.split_once('.') {
            Some((integer, fraction)) => (integer, fraction.trim_end_matches('0')),
            None => (rendered.as_str(), ""),
        };

        let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
        for (i, digit) in integer.chars().enumerate() {
            if i > 0 && (integer.len() - i) % 3 == 0 {
                grouped.push(group_sep);
            }
            grouped.push(digit);
        }

        let is_zero = integer.chars().all(|c| c == '0') && fraction.is_empty();
        let mut out = String::new();
        if value.is_sign_negative() && !is_zero {
            out.push('-');
        }
        out.push_str(&grouped);
        if !fraction.is_empty() {
            out.push(decimal_sep);
            out.push_str(fraction);
        }
        out
    }
}

/// Speed in meters per second as a short unit string.
pub fn speed_string(meters_per_second: f64, locale: &UnitLocale) -> String {
    let mph = meters_per_second * MPS_TO_MPH;
    if locale.uses_metric {
        let kph = meters_per_second * MPS_TO_KPH;
        if kph < 1.0 {
            format!("{:.0} mps", meters_per_second)
        } else if locale.is_gb() {
            format!("{:.1} mph", mph)
        } else {
            format!("{:.1} kph", kph)
        }
    } else if mph < 1.0 {
        format!("{:.0} fps", meters_per_second * METERS_TO_FEET)
    } else {
        format!("{:.1} mph", mph)
    }
}

/// Distance in meters using the locale's preferred unit.
pub fn distance_string(meters: f64, locale: &UnitLocale, suppress_fractional: bool) -> String {
    let fraction_digits = if suppress_fractional { 0 } else { 1 };
    let miles = || {
        format!(
            "{} miles",
            locale.format_decimal(meters * METERS_TO_MILES, fraction_digits)
        )
    };

    if locale.uses_metric {
        if meters < METERS_CUTOFF {
            format!("{} meters", locale.format_decimal(meters, 0))
        } else if locale.is_gb() {
            miles()
        } else {
            format!("{} km", locale.format_decimal(meters / 1000.0, fraction_digits))
        }
    } else {
        let feet = meters * METERS_TO_FEET;
        if feet < FEET_CUTOFF {
            format!("{} feet", locale.format_decimal(feet, 0))
        } else {
            miles()
        }
    }
}

/// Distance in the locale's major unit (miles or kilometers).
pub fn localized_major_unit(meters: f64, locale: &UnitLocale) -> f64 {
    if locale.uses_metric && !locale.is_gb() {
        meters / 1000.0
    } else {
        meters * METERS_TO_MILES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locale() {
        let us = UnitLocale::parse("en_US");
        assert_eq!(us.language, "en");
        assert_eq!(us.country_code.as_deref(), Some("US"));
        assert!(!us.uses_metric);

        let gb = UnitLocale::parse("en-GB");
        assert!(gb.uses_metric);
        assert!(gb.is_gb());

        assert!(!UnitLocale::parse("my_MM").uses_metric);
        assert!(UnitLocale::parse("fr").uses_metric);
        assert_eq!(
            UnitLocale::parse("zh_Hant_TW").country_code.as_deref(),
            Some("TW")
        );
    }

    #[test]
    fn test_speed_string_metric() {
        let de = UnitLocale::parse("de_DE");
        assert_eq!(speed_string(1.5 / 3.6, &de), "1.5 kph");
        assert_eq!(speed_string(0.2, &de), "0 mps");
        assert_eq!(speed_string(10.0, &de), "36.0 kph");

        let gb = UnitLocale::parse("en_GB");
        assert_eq!(speed_string(10.0, &gb), "22.4 mph");
    }

    #[test]
    fn test_speed_string_imperial() {
        let us = UnitLocale::parse("en_US");
        assert_eq!(speed_string(0.3, &us), "1 fps");
        assert_eq!(speed_string(5.0, &us), "11.2 mph");
    }

    #[test]
    fn test_format_decimal_grouping() {
        let en = UnitLocale::parse("en_US");
        assert_eq!(en.format_decimal(1234567.24, 1), "1,234,567.2");
        assert_eq!(en.format_decimal(12.0, 1), "12");
        assert_eq!(en.format_decimal(999.96, 1), "1,000");
        assert_eq!(en.format_decimal(-0.01, 1), "0");

        let de = UnitLocale::parse("de_DE");
        assert_eq!(de.format_decimal(1234.5, 1), "1.234,5");

        let fr = UnitLocale::parse("fr_FR");
        assert_eq!(fr.format_decimal(1234.5, 1), "1 234,5");
    }

    #[test]
    fn test_distance_string() {
        let us = UnitLocale::parse("en_US");
        assert_eq!(distance_string(100.0, &us, false), "328 feet");
        assert_eq!(distance_string(8046.72, &us, false), "5 miles");
        assert_eq!(distance_string(8046.72, &us, true), "5 miles");
        assert_eq!(distance_string(2414.0, &us, false), "1.5 miles");

        let de = UnitLocale::parse("de_DE");
        assert_eq!(distance_string(399.0, &de, false), "399 meters");
        assert_eq!(distance_string(12345.0, &de, false), "12,3 km");
        assert_eq!(distance_string(12345.0, &de, true), "12 km");

        let gb = UnitLocale::parse("en_GB");
        assert_eq!(distance_string(1609.344, &gb, false), "1 miles");
    }
}
