//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// Headers shown above the reminder list when `LIST_HEADERS` is not set.
const DEFAULT_LIST_HEADERS: &[&str] = &[
    "Don't forget!",
    "Things to remember",
    "Your reminders",
    "Coming up",
];

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` runs the service on the in-memory reminder store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub cors_origin: String,
    pub list_headers: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Web Settings ---
        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        if cors_origin.parse::<axum::http::HeaderValue>().is_err() {
            return Err(ConfigError::InvalidValue(
                "CORS_ORIGIN".to_string(),
                format!("'{}' is not a valid header value", cors_origin),
            ));
        }

        let list_headers = parse_list_headers(std::env::var("LIST_HEADERS").ok().as_deref());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            list_headers,
        })
    }
}

/// Splits a `|`-separated header list, falling back to the defaults when nothing usable is given.
pub fn parse_list_headers(raw: Option<&str>) -> Vec<String> {
    let headers: Vec<String> = raw
        .unwrap_or_default()
        .split('|')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();

    if headers.is_empty() {
        DEFAULT_LIST_HEADERS.iter().map(|h| h.to_string()).collect()
    } else {
        headers
    }
}
