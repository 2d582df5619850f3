// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OpenWeatherMap client for the conditions at the start of a trip.

use crate::models::Coordinate;
use serde::Deserialize;

/// Weather lookup errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Weather API key is not configured")]
    NotConfigured,

    #[error("Weather request failed: {0}")]
    Request(String),

    #[error("Weather API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Weather response had no conditions")]
    EmptyResponse,
}

/// Current conditions at a coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherCondition {
    /// OpenWeatherMap condition id (2xx thunderstorm ... 80x clouds)
    pub condition_code: u16,
    pub description: String,
    pub temperature_f: f64,
}

impl WeatherCondition {
    /// Emoji summarizing the condition.
    pub fn climacon(&self) -> &'static str {
        match self.condition_code {
            200..=299 => "⛈",
            300..=399 => "🌦",
            500..=599 => "🌧",
            600..=699 => "🌨",
            700..=780 => "🌫",
            781 => "🌪",
            800 => "☀️",
            801 => "🌤",
            802 => "⛅️",
            803..=804 => "☁️",
            _ => "🌡",
        }
    }

    fn from_response(response: CurrentWeatherResponse) -> Result<Self, WeatherError> {
        let condition = response
            .weather
            .into_iter()
            .next()
            .ok_or(WeatherError::EmptyResponse)?;
        Ok(Self {
            condition_code: condition.id,
            description: condition.description,
            temperature_f: response.main.temp,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    weather: Vec<ConditionEntry>,
    main: MainReadings,
}

#[derive(Debug, Deserialize)]
struct ConditionEntry {
    id: u16,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
}

/// OpenWeatherMap current-conditions client.
#[derive(Clone)]
pub struct WeatherService {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherService {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Current conditions at `coordinate`, temperature in Fahrenheit.
    pub async fn current_conditions(
        &self,
        coordinate: &Coordinate,
    ) -> Result<WeatherCondition, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::NotConfigured)?;

        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("units", "imperial".to_string()),
                ("appid", api_key.to_string()),
            ])
            .send()
            .await
            .map_err(|e| WeatherError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Weather lookup failed");
            return Err(WeatherError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CurrentWeatherResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Request(format!("JSON parse error: {}", e)))?;

        let condition = WeatherCondition::from_response(parsed)?;
        tracing::debug!(
            code = condition.condition_code,
            temperature = condition.temperature_f,
            "Fetched weather"
        );
        Ok(condition)
    }
}
