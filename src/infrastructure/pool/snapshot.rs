//! Point-in-time pool statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::{PoolCounters, Registry};
use super::{ConnectionPool, PoolSettings};
use crate::domain::{health_score, CircuitState, HealthInputs};

/// Pool statistics as reported by [`ConnectionPool::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub pool: String,
    pub active_connections: usize,
    pub available_connections: usize,
    pub pending_connections: usize,
    pub total_clients: usize,
    pub average_connections_per_client: f64,
    /// Connections held per client.
    pub client_distribution: BTreeMap<String, usize>,
    /// Messages sent plus received across live connections.
    pub total_messages: u64,
    pub average_latency_ms: f64,
    pub circuit_state: CircuitState,
    pub circuit_failures: u32,
    pub circuit_trips: u64,
    pub counters: PoolCounters,
    /// 0 to 100, see [`health_score`].
    pub health_score: f64,
    pub generated_at: DateTime<Utc>,
}

impl PoolSnapshot {
    pub(super) fn capture(name: &str, settings: &PoolSettings, registry: &Registry) -> Self {
        let active = registry.connections.len();
        let available = registry.available.len();

        let (total_messages, latency_sum) = registry.connections.values().fold(
            (0_u64, 0.0_f64),
            |(messages, latency), conn| {
                let stats = conn.stats();
                (
                    messages + stats.messages_sent() + stats.messages_received(),
                    latency + stats.average_latency_ms(),
                )
            },
        );
        let average_latency_ms = if active == 0 {
            0.0
        } else {
            latency_sum / active as f64
        };

        let total_clients = registry.clients.len();
        let average_connections_per_client = if total_clients == 0 {
            0.0
        } else {
            active as f64 / total_clients as f64
        };

        let client_distribution = registry
            .clients
            .iter()
            .map(|(client, ids)| (client.to_string(), ids.len()))
            .collect();

        let score = health_score(&HealthInputs {
            connection_errors: registry.counters.connection_errors,
            connections_created: registry.counters.connections_created,
            breaker_state: registry.breaker.state(),
            available_connections: available,
            active_connections: active,
            min_connections: settings.min_connections,
            max_connections: settings.max_connections,
        });

        Self {
            pool: name.to_string(),
            active_connections: active,
            available_connections: available,
            pending_connections: registry.pending,
            total_clients,
            average_connections_per_client,
            client_distribution,
            total_messages,
            average_latency_ms,
            circuit_state: registry.breaker.state(),
            circuit_failures: registry.breaker.failure_count(),
            circuit_trips: registry.breaker.trips(),
            counters: registry.counters,
            health_score: score,
            generated_at: Utc::now(),
        }
    }
}

impl ConnectionPool {
    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolSnapshot {
        let registry = self.inner.registry.lock();
        PoolSnapshot::capture(&self.inner.name, &self.inner.settings, &registry)
    }
}
