//! Runtime pool settings.

use std::time::Duration;

use crate::domain::BreakerSettings;
use crate::error::{ConfigError, Error, Result};

/// Retry policy for a single broadcast delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendRetry {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Linear backoff step; attempt `n` waits `backoff * n` before `n + 1`.
    pub backoff: Duration,
}

impl SendRetry {
    /// Sleep before the attempt following `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for SendRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Settings the pool runs with.
///
/// Built from [`PoolConfig`](crate::infrastructure::config::PoolConfig) in
/// production; tests construct it directly with short durations.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub name: String,
    pub min_connections: usize,
    pub max_connections: usize,
    pub max_connections_per_client: usize,
    pub idle_timeout: Duration,
    pub health_check_interval: Duration,
    pub cleanup_interval: Duration,
    pub stats_interval: Duration,
    pub enable_multiplexing: bool,
    pub max_subscriptions_per_connection: usize,
    pub retry: SendRetry,
    pub breaker: BreakerSettings,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            min_connections: 10,
            max_connections: 1000,
            max_connections_per_client: 5,
            idle_timeout: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
            stats_interval: Duration::from_secs(300),
            enable_multiplexing: true,
            max_subscriptions_per_connection: 100,
            retry: SendRetry::default(),
            breaker: BreakerSettings::default(),
        }
    }
}

impl PoolSettings {
    /// Validate settings values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if:
    /// - `name` is empty
    /// - `max_connections` is 0 or below `min_connections`
    /// - `max_connections_per_client` is 0
    /// - `max_subscriptions_per_connection` is 0
    /// - `send_retry_attempts` is 0
    /// - any supervisor interval or `idle_timeout` is zero
    /// - `failure_threshold` is 0
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &'static str, reason: &str| -> Error {
            ConfigError::InvalidValue {
                field,
                reason: reason.to_string(),
            }
            .into()
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(invalid("max_connections", "must be > 0"));
        }
        if self.min_connections > self.max_connections {
            return Err(invalid("min_connections", "must be <= max_connections"));
        }
        if self.max_connections_per_client == 0 {
            return Err(invalid("max_connections_per_client", "must be > 0"));
        }
        if self.max_subscriptions_per_connection == 0 {
            return Err(invalid("max_subscriptions_per_connection", "must be > 0"));
        }
        if self.retry.attempts == 0 {
            return Err(invalid("send_retry_attempts", "must be > 0"));
        }
        if self.idle_timeout.is_zero() {
            return Err(invalid("idle_timeout_secs", "must be > 0"));
        }
        if self.health_check_interval.is_zero() {
            return Err(invalid("health_check_interval_secs", "must be > 0"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(invalid("cleanup_interval_secs", "must be > 0"));
        }
        if self.stats_interval.is_zero() {
            return Err(invalid("stats_interval_secs", "must be > 0"));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(invalid("failure_threshold", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PoolSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_min_above_max() {
        let settings = PoolSettings {
            min_connections: 6,
            max_connections: 5,
            ..PoolSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(Error::Config(ConfigError::InvalidValue {
                field: "min_connections",
                ..
            }))
        ));
    }

    #[test]
    fn rejects_zero_retry_attempts() {
        let settings = PoolSettings {
            retry: SendRetry {
                attempts: 0,
                backoff: Duration::ZERO,
            },
            ..PoolSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn retry_delay_is_linear() {
        let retry = SendRetry::default();
        assert_eq!(retry.delay(1), Duration::from_millis(100));
        assert_eq!(retry.delay(2), Duration::from_millis(200));
    }
}
