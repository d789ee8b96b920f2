// ============================
// backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "roomsync.toml";

/// Prefix of environment overrides, e.g. `ROOMSYNC_RATE_LIMIT__MAX_REQUESTS`
pub const ENV_PREFIX: &str = "ROOMSYNC_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Capacity of each connection's outbound frame queue
    pub outbound_buffer: usize,
    /// Largest accepted inbound WebSocket message
    pub max_message_bytes: usize,
    /// HTTP rate limiting
    pub rate_limit: RateLimitSettings,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Fixed-window rate limit for the REST surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Requests allowed per client per window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            outbound_buffer: 64,
            max_message_bytes: 1024 * 1024,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
        }
    }
}

impl Settings {
    /// Load settings from `roomsync.toml` and the environment
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from `path` (optional file) and the environment
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let settings: Settings = Self::figment(path.as_ref()).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults, then the TOML file, then `ROOMSYNC_` variables
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(AppError::InvalidInput(format!(
                "log_level must be one of {LOG_LEVELS:?}, got {}",
                self.log_level
            )));
        }
        if self.outbound_buffer == 0 {
            return Err(AppError::InvalidInput(
                "outbound_buffer must be greater than zero".to_string(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(AppError::InvalidInput(
                "max_message_bytes must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(AppError::InvalidInput(
                "rate_limit values must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
