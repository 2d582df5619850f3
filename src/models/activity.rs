// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Motion activity updates reported by the platform coprocessor.

use crate::models::{ActivityType, ModelError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coprocessor confidence, stored as its raw integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum ActivityConfidence {
    #[default]
    Low = 0,
    Medium = 1,
    High = 2,
}

impl TryFrom<i16> for ActivityConfidence {
    type Error = ModelError;

    fn try_from(raw: i16) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(ActivityConfidence::Low),
            1 => Ok(ActivityConfidence::Medium),
            2 => Ok(ActivityConfidence::High),
            _ => Err(ModelError::OutOfRange("confidence", i64::from(raw))),
        }
    }
}

impl From<ActivityConfidence> for i16 {
    fn from(value: ActivityConfidence) -> Self {
        value as i16
    }
}

/// A motion activity sample. Several flags may be set at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionActivity {
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub confidence: ActivityConfidence,
    #[serde(default)]
    pub automotive: bool,
    #[serde(default)]
    pub cycling: bool,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub stationary: bool,
    #[serde(default)]
    pub walking: bool,
    #[serde(default)]
    pub unknown: bool,
}

impl MotionActivity {
    pub fn new(start_date: DateTime<Utc>, confidence: ActivityConfidence) -> Self {
        Self {
            start_date,
            confidence,
            automotive: false,
            cycling: false,
            running: false,
            stationary: false,
            walking: false,
            unknown: false,
        }
    }

    /// Collapse the flags into a single mode. Self-propelled modes win.
    pub fn activity_type(&self) -> ActivityType {
        if self.cycling {
            ActivityType::Cycling
        } else if self.running {
            ActivityType::Running
        } else if self.walking {
            ActivityType::Walking
        } else if self.automotive {
            ActivityType::Automotive
        } else if self.stationary {
            ActivityType::Stationary
        } else {
            ActivityType::Unknown
        }
    }
}
