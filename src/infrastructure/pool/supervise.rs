//! Background supervisors.
//!
//! Each supervisor runs on its own interval, skipping the immediate first
//! tick, and holds only a weak handle to the pool so dropping the last
//! [`ConnectionPool`](super::ConnectionPool) ends it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::snapshot::PoolSnapshot;
use super::PoolInner;
use crate::domain::{health_score, CircuitState, ConnectionId, HealthInputs};

/// Health score above which an open breaker is reset by the stats reporter.
const BREAKER_RESET_SCORE: f64 = 80.0;

pub(super) fn spawn_all(inner: &Arc<PoolInner>) -> Vec<JoinHandle<()>> {
    let settings = &inner.settings;
    vec![
        spawn_loop(
            inner,
            settings.health_check_interval,
            "health_check",
            |pool| async move { pool.run_health_check().await },
        ),
        spawn_loop(inner, settings.cleanup_interval, "cleanup", |pool| async move {
            pool.run_cleanup().await;
        }),
        spawn_loop(inner, settings.stats_interval, "stats", |pool| async move {
            pool.report_stats();
        }),
    ]
}

fn spawn_loop<F, Fut>(
    inner: &Arc<PoolInner>,
    period: Duration,
    task: &'static str,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<PoolInner>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let pool = Arc::downgrade(inner);
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(task, "Supervisor started");

        loop {
            interval.tick().await;
            let Some(pool) = pool.upgrade() else {
                break;
            };
            tick(pool).await;
        }

        debug!(task, "Supervisor stopped");
    })
}

impl PoolInner {
    /// Ping every connection; evict the unhealthy, the unresponsive and the
    /// idle; refill to the minimum.
    pub(super) async fn run_health_check(&self) {
        let connections: Vec<_> = {
            let registry = self.registry.lock();
            if registry.closed {
                return;
            }
            registry.connections.values().cloned().collect()
        };

        let alive = join_all(connections.iter().map(|conn| async move {
            if !conn.is_healthy() {
                return false;
            }
            match conn.ping().await {
                Ok(_) => true,
                Err(e) => {
                    warn!(connection_id = %conn.id(), error = %e, "Health check failed");
                    false
                }
            }
        }))
        .await;

        let doomed: Vec<ConnectionId> = connections
            .iter()
            .zip(alive)
            .filter_map(|(conn, alive)| {
                if !alive {
                    return Some(conn.id());
                }
                let idle = conn.idle_duration();
                if idle > self.settings.idle_timeout {
                    info!(connection_id = %conn.id(), idle_secs = idle.as_secs(), "Connection idle too long");
                    return Some(conn.id());
                }
                None
            })
            .collect();

        let evicted: Vec<_> = {
            let mut registry = self.registry.lock();
            doomed.iter().filter_map(|id| registry.evict(id)).collect()
        };
        if !evicted.is_empty() {
            info!(pool = %self.name, evicted = evicted.len(), checked = connections.len(), "Health check evicted connections");
        }
        self.retire(evicted).await;
    }

    /// Prune empty topic and client entries; refill to the minimum.
    pub(super) async fn run_cleanup(&self) {
        let (topics, clients) = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return;
            }
            registry.prune_empty()
        };
        if topics + clients > 0 {
            debug!(pool = %self.name, topics, clients, "Pruned empty index entries");
        }
        self.ensure_minimum().await;
    }

    /// Log a snapshot and reset an open breaker when the pool is otherwise
    /// healthy.
    ///
    /// The reset decision ignores the open breaker's own deduction;
    /// otherwise an open breaker could never score above the threshold.
    pub(super) fn report_stats(&self) -> PoolSnapshot {
        let mut registry = self.registry.lock();
        let snapshot = PoolSnapshot::capture(&self.name, &self.settings, &registry);

        if registry.breaker.state() == CircuitState::Open {
            let underlying = health_score(&HealthInputs {
                connection_errors: registry.counters.connection_errors,
                connections_created: registry.counters.connections_created,
                breaker_state: CircuitState::Closed,
                available_connections: snapshot.available_connections,
                active_connections: snapshot.active_connections,
                min_connections: self.settings.min_connections,
                max_connections: self.settings.max_connections,
            });
            if underlying > BREAKER_RESET_SCORE {
                registry.breaker.reset();
                info!(pool = %self.name, score = underlying, "Pool healthy, circuit breaker reset");
            }
        }
        drop(registry);

        match serde_json::to_string(&snapshot) {
            Ok(json) => info!(pool = %self.name, stats = %json, "Connection pool stats"),
            Err(e) => warn!(pool = %self.name, error = %e, "Failed to serialize pool stats"),
        }
        snapshot
    }
}
