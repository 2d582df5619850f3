//! Application configuration loaded from environment variables.
//!
//! Secrets that are not supplied through the environment (the JWT signing
//! key, the weather API key) fall back to the encrypted keychain at startup.

use crate::models::RatingVersion;
use crate::units::UnitLocale;
use std::env;

/// Current-conditions endpoint used when `WEATHER_API_URL` is unset.
pub const DEFAULT_WEATHER_API_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Server port
    pub port: u16,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID; the in-memory store is used when absent
    pub gcp_project_id: Option<String>,
    /// Locale for distance/speed strings
    pub locale: UnitLocale,
    /// Weather endpoint
    pub weather_api_url: String,
    /// Keychain file location
    pub keychain_path: String,
    /// Rating version assigned to new ratings
    pub rating_version: RatingVersion,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Option<Vec<u8>>,
    /// OpenWeatherMap API key
    pub openweathermap_api_key: Option<String>,
    /// Master secret for the keychain
    pub keychain_secret: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: None,
            locale: UnitLocale::default(),
            weather_api_url: DEFAULT_WEATHER_API_URL.to_string(),
            keychain_path: "ride-report.keychain".to_string(),
            rating_version: RatingVersion::V1,
            jwt_signing_key: Some(b"test_jwt_key_32_bytes_minimum!!".to_vec()),
            openweathermap_api_key: None,
            keychain_secret: "test_keychain_secret".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let rating_version = match env::var("RATING_VERSION") {
            Ok(raw) => parse_rating_version(&raw)?,
            Err(_) => RatingVersion::V1,
        };

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: non_empty_var("GCP_PROJECT_ID"),
            locale: non_empty_var("RIDE_REPORT_LOCALE")
                .map(|id| UnitLocale::parse(&id))
                .unwrap_or_default(),
            weather_api_url: non_empty_var("WEATHER_API_URL")
                .unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string()),
            keychain_path: non_empty_var("KEYCHAIN_PATH")
                .unwrap_or_else(|| "ride-report.keychain".to_string()),
            rating_version,

            jwt_signing_key: non_empty_var("JWT_SIGNING_KEY").map(String::into_bytes),
            openweathermap_api_key: non_empty_var("OPENWEATHERMAP_API_KEY"),
            keychain_secret: env::var("KEYCHAIN_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("KEYCHAIN_SECRET"))?,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_rating_version(raw: &str) -> Result<RatingVersion, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "v1" | "1" => Ok(RatingVersion::V1),
        "v2" | "v2beta" | "2" => Ok(RatingVersion::V2Beta),
        _ => Err(ConfigError::Invalid {
            name: "RATING_VERSION",
            value: raw.to_string(),
        }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
