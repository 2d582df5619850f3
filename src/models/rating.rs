// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trip ratings and the versioned vocabulary used to present them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum RatingChoice {
    #[default]
    NotSet = 0,
    Good = 1,
    Bad = 2,
    Mixed = 3,
}

impl RatingChoice {
    pub fn raw(self) -> i16 {
        self as i16
    }

    fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(RatingChoice::NotSet),
            1 => Some(RatingChoice::Good),
            2 => Some(RatingChoice::Bad),
            3 => Some(RatingChoice::Mixed),
            _ => None,
        }
    }

    /// Notification action bound to this choice.
    pub fn notification_action_identifier(self) -> &'static str {
        match self {
            RatingChoice::Bad => "BAD_RIDE_IDENTIFIER",
            RatingChoice::Good => "GOOD_RIDE_IDENTIFIER",
            RatingChoice::Mixed => "MIXED_RIDE_IDENTIFIER",
            RatingChoice::NotSet => "",
        }
    }
}

impl From<i16> for RatingChoice {
    fn from(raw: i16) -> Self {
        RatingChoice::from_raw(raw).unwrap_or_default()
    }
}

impl From<RatingChoice> for i16 {
    fn from(value: RatingChoice) -> Self {
        value.raw()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum RatingVersion {
    #[default]
    V1 = 0,
    V2Beta = 1,
}

impl RatingVersion {
    pub fn raw(self) -> i16 {
        self as i16
    }

    pub fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(RatingVersion::V1),
            1 => Some(RatingVersion::V2Beta),
            _ => None,
        }
    }

    /// Ratings offered to the rider, in display order.
    pub fn available_ratings(self) -> Vec<Rating> {
        let choices: &[RatingChoice] = match self {
            RatingVersion::V1 => &[RatingChoice::Bad, RatingChoice::Good],
            RatingVersion::V2Beta => &[RatingChoice::Bad, RatingChoice::Mixed, RatingChoice::Good],
        };
        choices.iter().map(|&c| Rating::new(c, self)).collect()
    }
}

impl From<i16> for RatingVersion {
    fn from(raw: i16) -> Self {
        RatingVersion::from_raw(raw).unwrap_or_default()
    }
}

impl From<RatingVersion> for i16 {
    fn from(value: RatingVersion) -> Self {
        value.raw()
    }
}

/// A rating choice together with the vocabulary version it was made under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rating {
    pub choice: RatingChoice,
    pub version: RatingVersion,
}

impl Rating {
    pub fn new(choice: RatingChoice, version: RatingVersion) -> Self {
        Self { choice, version }
    }

    /// Build a rating from raw integers. Unknown choices become `NotSet`;
    /// unknown versions fall back to the profile's version.
    pub fn from_raw(choice: i64, version: i64, fallback_version: RatingVersion) -> Self {
        Self {
            choice: i16::try_from(choice)
                .ok()
                .and_then(RatingChoice::from_raw)
                .unwrap_or_default(),
            version: i16::try_from(version)
                .ok()
                .and_then(RatingVersion::from_raw)
                .unwrap_or(fallback_version),
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self.choice {
            RatingChoice::Bad => "😡",
            RatingChoice::Good => "☺️",
            RatingChoice::Mixed => "😕",
            RatingChoice::NotSet => "",
        }
    }

    pub fn noun(&self) -> &'static str {
        match (self.version, self.choice) {
            (_, RatingChoice::NotSet) => "",
            (_, RatingChoice::Mixed) => "Mixed",
            (RatingVersion::V1, RatingChoice::Bad) => "Not Great",
            (RatingVersion::V1, RatingChoice::Good) => "Great",
            (RatingVersion::V2Beta, RatingChoice::Bad) => "Stressful",
            (RatingVersion::V2Beta, RatingChoice::Good) => "Chill",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_ratings() {
        let v1: Vec<_> = RatingVersion::V1
            .available_ratings()
            .iter()
            .map(|r| r.choice)
            .collect();
        assert_eq!(v1, vec![RatingChoice::Bad, RatingChoice::Good]);

        let v2: Vec<_> = RatingVersion::V2Beta
            .available_ratings()
            .iter()
            .map(|r| r.noun())
            .collect();
        assert_eq!(v2, vec!["Stressful", "Mixed", "Chill"]);
    }

    #[test]
    fn test_from_raw_fallbacks() {
        let rating = Rating::from_raw(9, 1, RatingVersion::V1);
        assert_eq!(rating.choice, RatingChoice::NotSet);
        assert_eq!(rating.version, RatingVersion::V2Beta);

        let rating = Rating::from_raw(2, 7, RatingVersion::V2Beta);
        assert_eq!(rating.choice, RatingChoice::Bad);
        assert_eq!(rating.version, RatingVersion::V2Beta);
        assert_eq!(rating.noun(), "Stressful");
    }

    #[test]
    fn test_from_raw_out_of_i16_range() {
        // 65537 and 65536 truncate to 1 and 0 as i16
        let rating = Rating::from_raw(65537, 65536, RatingVersion::V2Beta);
        assert_eq!(rating.choice, RatingChoice::NotSet);
        assert_eq!(rating.version, RatingVersion::V2Beta);

        let rating = Rating::from_raw(-65535, i64::MAX, RatingVersion::V1);
        assert_eq!(rating.choice, RatingChoice::NotSet);
        assert_eq!(rating.version, RatingVersion::V1);
    }

    #[test]
    fn test_emoji_and_nouns() {
        let good = Rating::new(RatingChoice::Good, RatingVersion::V1);
        assert_eq!(good.emoji(), "☺️");
        assert_eq!(good.noun(), "Great");

        let unset = Rating::default();
        assert_eq!(unset.emoji(), "");
        assert_eq!(unset.noun(), "");
    }
}
