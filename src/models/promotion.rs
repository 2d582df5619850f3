// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Marketing banners shown above the trip list.

use crate::models::{json_str, ModelError};
use crate::time_utils::parse_json_date;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Promotion {
    pub uuid: String,
    #[serde(default)]
    pub banner_image_url: Option<String>,
    #[serde(default)]
    pub button_title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_user_dismissed: bool,
    #[serde(default)]
    pub connected_app_uuid: Option<String>,
}

impl Promotion {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Self::default()
        }
    }

    /// The `uuid` of a promotion payload.
    pub fn uuid_from_json(value: &Value) -> Result<&str, ModelError> {
        json_str(value, "uuid")
    }

    /// Merge fields present in `value`. Absent or malformed keys leave the
    /// current value untouched.
    pub fn update_with_json(&mut self, value: &Value) {
        let string = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let date = |key: &str| value.get(key).and_then(Value::as_str).and_then(parse_json_date);

        if let Some(banner) = string("banner_image") {
            self.banner_image_url = Some(banner);
        }
        if let Some(text) = string("text") {
            self.text = Some(text);
        }
        if let Some(title) = string("button_title") {
            self.button_title = Some(title);
        }
        if let Some(begins) = date("begins") {
            self.start_date = Some(begins);
        }
        if let Some(ends) = date("ends") {
            self.end_date = Some(ends);
        }
        if let Some(app) = string("application_uuid") {
            self.connected_app_uuid = Some(app);
        }
    }

    /// Whether the banner should be shown at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_user_dismissed
            && self.start_date.map_or(true, |start| start <= now)
            && self.end_date.map_or(true, |end| now <= end)
    }
}
