//! Configuration and settings management
//!
//! Loads settings from environment variables and defines the process-wide
//! rate-limit and retry constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Optional mirror-API endpoint used as an Instagram fallback
    #[serde(default)]
    pub mirror_api_url: Option<String>,

    /// Optional API key for the mirror endpoint
    #[serde(default)]
    pub mirror_api_key: Option<String>,
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }
}

// Rate limiting configuration
/// Maximum admitted requests per user within one sliding window.
pub const REQUEST_LIMIT: usize = 3;
/// Sliding window length in seconds. Default: 5 minutes.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 300;
/// Ban length in seconds once the limit is exceeded. Default: 30 minutes.
pub const BAN_DURATION_SECS: u64 = 1800;
/// Interval between stale-entry eviction passes. Default: 10 minutes.
pub const EVICTION_INTERVAL_SECS: u64 = 600;

// Telegram API retry configuration
/// Maximum retry attempts for Telegram API operations.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff delay in milliseconds.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff delay in milliseconds.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

/// Get the per-window request limit from env or default.
///
/// Environment variable: `REQUEST_LIMIT`.
#[must_use]
pub fn get_request_limit() -> usize {
    std::env::var("REQUEST_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(REQUEST_LIMIT)
}

/// Get the sliding window length from env or default.
///
/// Environment variable: `RATE_LIMIT_WINDOW_SECS`.
#[must_use]
pub fn get_rate_limit_window() -> u64 {
    std::env::var("RATE_LIMIT_WINDOW_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(RATE_LIMIT_WINDOW_SECS)
}

/// Get the ban duration from env or default.
///
/// Environment variable: `BAN_DURATION_SECS`.
#[must_use]
pub fn get_ban_duration() -> u64 {
    std::env::var("BAN_DURATION_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(BAN_DURATION_SECS)
}

/// Get the eviction interval from env or default.
///
/// Environment variable: `EVICTION_INTERVAL_SECS`.
#[must_use]
pub fn get_eviction_interval() -> u64 {
    std::env::var("EVICTION_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(EVICTION_INTERVAL_SECS)
}
