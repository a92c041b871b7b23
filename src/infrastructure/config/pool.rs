//! Connection pool and circuit breaker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::BreakerSettings;
use crate::infrastructure::pool::{PoolSettings, SendRetry};

/// Connection pool configuration as read from the config file.
///
/// Durations are whole seconds (milliseconds for the retry backoff); see
/// [`PoolSettings`] for the runtime form.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Pool name used in logs.
    #[serde(default = "default_pool_name")]
    pub name: String,
    /// Connections kept open even when no client uses them.
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,
    /// Hard cap on physical connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections a single client may hold before it is migrated.
    #[serde(default = "default_max_connections_per_client")]
    pub max_connections_per_client: usize,
    /// Seconds without traffic before a connection is evicted.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Seconds between health-check sweeps.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    /// Share physical connections between clients.
    #[serde(default = "default_true")]
    pub enable_multiplexing: bool,
    /// Topic subscriptions one connection may carry.
    #[serde(default = "default_max_subscriptions_per_connection")]
    pub max_subscriptions_per_connection: usize,
    /// Send attempts per broadcast target.
    #[serde(default = "default_send_retry_attempts")]
    pub send_retry_attempts: u32,
    /// Linear backoff step between send attempts (milliseconds).
    #[serde(default = "default_send_retry_backoff_ms")]
    pub send_retry_backoff_ms: u64,
    /// Seconds between index cleanup sweeps.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Seconds between statistics reports.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_pool_name() -> String {
    "default".to_string()
}

const fn default_min_connections() -> usize {
    10
}

const fn default_max_connections() -> usize {
    1000
}

const fn default_max_connections_per_client() -> usize {
    5
}

const fn default_idle_timeout_secs() -> u64 {
    300 // 5 minutes
}

const fn default_health_check_interval_secs() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

const fn default_max_subscriptions_per_connection() -> usize {
    100
}

const fn default_send_retry_attempts() -> u32 {
    3
}

const fn default_send_retry_backoff_ms() -> u64 {
    100
}

const fn default_cleanup_interval_secs() -> u64 {
    60
}

const fn default_stats_interval_secs() -> u64 {
    300 // 5 minutes
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            max_connections_per_client: default_max_connections_per_client(),
            idle_timeout_secs: default_idle_timeout_secs(),
            health_check_interval_secs: default_health_check_interval_secs(),
            enable_multiplexing: default_true(),
            max_subscriptions_per_connection: default_max_subscriptions_per_connection(),
            send_retry_attempts: default_send_retry_attempts(),
            send_retry_backoff_ms: default_send_retry_backoff_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Circuit breaker configuration for connection acquisition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive acquisition failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before allowing a trial call.
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_recovery_timeout_secs() -> u64 {
    60
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
        }
    }
}

impl PoolConfig {
    /// Combine with breaker settings into the runtime form.
    #[must_use]
    pub fn to_settings(&self, breaker: &CircuitBreakerConfig) -> PoolSettings {
        PoolSettings {
            name: self.name.clone(),
            min_connections: self.min_connections,
            max_connections: self.max_connections,
            max_connections_per_client: self.max_connections_per_client,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            health_check_interval: Duration::from_secs(self.health_check_interval_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            stats_interval: Duration::from_secs(self.stats_interval_secs),
            enable_multiplexing: self.enable_multiplexing,
            max_subscriptions_per_connection: self.max_subscriptions_per_connection,
            retry: SendRetry {
                attempts: self.send_retry_attempts,
                backoff: Duration::from_millis(self.send_retry_backoff_ms),
            },
            breaker: breaker.into(),
        }
    }
}
