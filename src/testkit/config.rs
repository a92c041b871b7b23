//! Canonical test configurations.
//!
//! Single source of truth for settings used across tests. Supervisor
//! intervals default to an hour so they stay out of the way unless a test
//! shortens them.

use std::time::Duration;

use crate::domain::BreakerSettings;
use crate::infrastructure::pool::{PoolSettings, SendRetry};

/// Pool settings with the given limits.
///
/// Multiplexing is off, retries back off by 1 ms, and the breaker trips
/// after 5 failures.
pub fn pool(min_connections: usize, max_connections: usize) -> PoolSettings {
    PoolSettings {
        name: "test".to_string(),
        min_connections,
        max_connections,
        max_connections_per_client: 5,
        idle_timeout: Duration::from_secs(300),
        health_check_interval: Duration::from_secs(3600),
        cleanup_interval: Duration::from_secs(3600),
        stats_interval: Duration::from_secs(3600),
        enable_multiplexing: false,
        max_subscriptions_per_connection: 100,
        retry: SendRetry {
            attempts: 3,
            backoff: Duration::from_millis(1),
        },
        breaker: breaker(5, Duration::from_secs(60)),
    }
}

/// Same as [`pool`] with multiplexing on.
pub fn multiplexed(min_connections: usize, max_connections: usize) -> PoolSettings {
    PoolSettings {
        enable_multiplexing: true,
        ..pool(min_connections, max_connections)
    }
}

pub fn breaker(failure_threshold: u32, recovery_timeout: Duration) -> BreakerSettings {
    BreakerSettings {
        failure_threshold,
        recovery_timeout,
    }
}
