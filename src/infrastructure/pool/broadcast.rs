//! Broadcast delivery with per-target retry.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use super::connection::PooledConnection;
use super::settings::SendRetry;
use super::state::Registry;
use super::ConnectionPool;
use crate::domain::{ClientId, ConnectionId, Topic};
use crate::error::{PoolError, Result, TransportError};

/// Outcome of a [`ConnectionPool::broadcast`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Connections the message reached.
    pub sent: usize,
    /// Connections that failed after retries.
    pub failed: usize,
    /// Client bound to each connection that received the message.
    pub recipients: Vec<ClientId>,
}

impl ConnectionPool {
    /// Send `message` to a set of connections.
    ///
    /// Targets are the subscribers of `topic` when a topic is given,
    /// otherwise the connections of `client_ids` when given, otherwise every
    /// connection in the pool. Per-connection failures are counted in the
    /// report, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] after shutdown.
    pub async fn broadcast(
        &self,
        message: &str,
        client_ids: Option<&[ClientId]>,
        topic: Option<&Topic>,
    ) -> Result<DeliveryReport> {
        let targets = {
            let registry = self.inner.registry.lock();
            if registry.closed {
                return Err(PoolError::ShutDown.into());
            }
            select_targets(&registry, client_ids, topic)
        };

        let retry = self.inner.settings.retry;
        let outcomes =
            join_all(targets.iter().map(|conn| send_with_retry(conn, message, retry))).await;

        let mut report = DeliveryReport::default();
        for (conn, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    report.sent += 1;
                    report.recipients.push(conn.client_id());
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(connection_id = %conn.id(), error = %e, "Broadcast delivery failed");
                }
            }
        }

        self.inner.registry.lock().counters.messages_sent += report.sent as u64;
        debug!(
            topic = topic.map(Topic::as_str),
            targets = targets.len(),
            sent = report.sent,
            failed = report.failed,
            "Broadcast complete"
        );
        Ok(report)
    }
}

fn select_targets(
    registry: &Registry,
    client_ids: Option<&[ClientId]>,
    topic: Option<&Topic>,
) -> Vec<Arc<PooledConnection>> {
    let ids: HashSet<ConnectionId> = match (topic, client_ids) {
        (Some(topic), _) => registry.topics.get(topic).cloned().unwrap_or_default(),
        (None, Some(clients)) => clients
            .iter()
            .filter_map(|client| registry.clients.get(client))
            .flatten()
            .copied()
            .collect(),
        (None, None) => registry.connections.keys().copied().collect(),
    };

    ids.iter().filter_map(|id| registry.get(id)).collect()
}

/// Send with linear backoff. A closed connection is not retried.
async fn send_with_retry(
    conn: &PooledConnection,
    message: &str,
    retry: SendRetry,
) -> std::result::Result<(), TransportError> {
    let mut attempt = 1;
    loop {
        match conn.send(message).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_closed() || attempt >= retry.attempts => return Err(err),
            Err(err) => {
                debug!(connection_id = %conn.id(), attempt, error = %err, "Send failed, retrying");
                tokio::time::sleep(retry.delay(attempt)).await;
                attempt += 1;
            }
        }
    }
}
