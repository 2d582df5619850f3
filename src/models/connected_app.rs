// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Third-party apps a rider can link to their profile.

use crate::models::{json_str, ModelError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectedApp {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_image_url: Option<String>,
    #[serde(default)]
    pub description_text: Option<String>,
    #[serde(default)]
    pub app_settings_url: Option<String>,
    #[serde(default)]
    pub app_settings_text: Option<String>,
    /// Linked to the rider's profile
    #[serde(default)]
    pub is_connected: bool,
}

impl ConnectedApp {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Self::default()
        }
    }

    pub fn uuid_from_json(value: &Value) -> Result<&str, ModelError> {
        json_str(value, "uuid")
    }

    /// Merge fields present in `value`; absent keys keep their value.
    pub fn update_with_json(&mut self, value: &Value) {
        let fields = [
            ("name", &mut self.name),
            ("base_image_url", &mut self.base_image_url),
            ("description_text", &mut self.description_text),
            ("app_settings_url", &mut self.app_settings_url),
            ("app_settings_text", &mut self.app_settings_text),
        ];
        for (key, field) in fields {
            if let Some(s) = value.get(key).and_then(Value::as_str) {
                *field = Some(s.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_with_json_keeps_absent_fields() {
        let mut app = ConnectedApp::new("APP-1");
        app.description_text = Some("Commute challenge".into());
        app.update_with_json(&json!({
            "uuid": "app-1",
            "name": "Bike Club",
            "base_image_url": 7,
            "app_settings_url": "https://example.com/settings"
        }));

        assert_eq!(app.uuid, "APP-1");
        assert_eq!(app.name.as_deref(), Some("Bike Club"));
        assert!(app.base_image_url.is_none());
        assert_eq!(app.description_text.as_deref(), Some("Commute challenge"));
        assert_eq!(
            app.app_settings_url.as_deref(),
            Some("https://example.com/settings")
        );
        assert!(!app.is_connected);
    }
}
