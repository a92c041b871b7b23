//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings.
//! Configuration is loaded from a TOML file; a handful of pool limits can be
//! overridden from the environment (`WS_POOL_MIN_CONNECTIONS`,
//! `WS_POOL_MAX_CONNECTIONS`, `WS_MAX_CONNECTIONS_PER_CLIENT`,
//! `WS_IDLE_TIMEOUT`, `WS_HEALTH_CHECK_INTERVAL`).
//!
//! # Example
//!
//! ```no_run
//! use wsmux::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::logging::{LoggingConfig, LOG_FORMATS};
use super::pool::{CircuitBreakerConfig, PoolConfig};
use crate::error::{ConfigError, Result};
use crate::infrastructure::pool::PoolSettings;

/// Upstream endpoint the pooled connections dial.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    #[serde(default)]
    pub url: String,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How long a health-check ping waits for the pong, in milliseconds.
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

const fn default_ping_timeout_ms() -> u64 {
    10_000
}

impl UpstreamConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Upstream endpoint settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Connection pool limits and supervisor intervals.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Circuit breaker guarding acquisition.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// Environment overrides are applied before validation.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TOML content is malformed
    /// - An environment override is not a number
    /// - Validation fails
    pub fn parse_toml(content: &str) -> Result<Self> {
        Self::parse_toml_with(content, |key| std::env::var(key).ok())
    }

    /// Like [`parse_toml`](Self::parse_toml) with an explicit variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`parse_toml`](Self::parse_toml).
    pub fn parse_toml_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Initialize logging from the `[logging]` section.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Runtime pool settings derived from `[pool]` and `[circuit_breaker]`.
    #[must_use]
    pub fn pool_settings(&self) -> PoolSettings {
        self.pool.to_settings(&self.circuit_breaker)
    }

    /// Parsed upstream URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing or malformed.
    pub fn upstream_url(&self) -> Result<Url> {
        if self.upstream.url.is_empty() {
            return Err(ConfigError::MissingField { field: "url" }.into());
        }
        Ok(Url::parse(&self.upstream.url)?)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override(&lookup, "WS_POOL_MIN_CONNECTIONS")? {
            self.pool.min_connections = v;
        }
        if let Some(v) = parse_override(&lookup, "WS_POOL_MAX_CONNECTIONS")? {
            self.pool.max_connections = v;
        }
        if let Some(v) = parse_override(&lookup, "WS_MAX_CONNECTIONS_PER_CLIENT")? {
            self.pool.max_connections_per_client = v;
        }
        if let Some(v) = parse_override(&lookup, "WS_IDLE_TIMEOUT")? {
            self.pool.idle_timeout_secs = v;
        }
        if let Some(v) = parse_override(&lookup, "WS_HEALTH_CHECK_INTERVAL")? {
            self.pool.health_check_interval_secs = v;
        }
        Ok(())
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "format",
                reason: format!("must be one of {}", LOG_FORMATS.join(", ")),
            }
            .into());
        }

        if !self.upstream.url.is_empty() {
            let url = Url::parse(&self.upstream.url).map_err(|e| ConfigError::InvalidValue {
                field: "url",
                reason: e.to_string(),
            })?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(ConfigError::InvalidValue {
                    field: "url",
                    reason: "scheme must be ws or wss".to_string(),
                }
                .into());
            }
        }
        if self.upstream.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.upstream.ping_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ping_timeout_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        self.pool_settings().validate()?;
        Ok(())
    }
}

fn parse_override<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| {
            ConfigError::InvalidValue {
                field: key,
                reason: format!("expected a non-negative integer, got {raw:?}"),
            }
            .into()
        })
}
