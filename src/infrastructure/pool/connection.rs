//! A physical connection as seen by the pool.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{ClientId, ConnectionId, ConnectionStats, Metadata, Topic};
use crate::error::TransportError;
use crate::port::Connection;

/// Mutable per-connection state, guarded by the connection's own lock.
///
/// Lock order: the pool registry lock is taken before this one, never after.
#[derive(Debug)]
struct Binding {
    client_id: ClientId,
    metadata: Metadata,
    stats: ConnectionStats,
    subscriptions: HashSet<Topic>,
}

/// One physical connection plus its bookkeeping.
///
/// Health only ever moves from healthy to unhealthy; an unhealthy connection
/// is evicted on release or by the next health check.
pub struct PooledConnection {
    id: ConnectionId,
    pool_name: Arc<str>,
    handle: Box<dyn Connection>,
    healthy: AtomicBool,
    binding: Mutex<Binding>,
}

impl PooledConnection {
    pub(super) fn new(
        id: ConnectionId,
        pool_name: Arc<str>,
        handle: Box<dyn Connection>,
        client_id: ClientId,
        metadata: Metadata,
    ) -> Self {
        Self {
            id,
            pool_name,
            handle,
            healthy: AtomicBool::new(true),
            binding: Mutex::new(Binding {
                client_id,
                metadata,
                stats: ConnectionStats::new(),
                subscriptions: HashSet::new(),
            }),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Name of the pool this connection belongs to.
    #[must_use]
    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    /// Client currently bound to this connection.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.binding.lock().client_id.clone()
    }

    #[must_use]
    pub fn metadata(&self) -> Metadata {
        self.binding.lock().metadata.clone()
    }

    /// Topics this connection is subscribed to.
    #[must_use]
    pub fn subscriptions(&self) -> HashSet<Topic> {
        self.binding.lock().subscriptions.clone()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.binding.lock().subscriptions.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.binding.lock().subscriptions.contains(topic)
    }

    /// Copy of the connection's statistics.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.binding.lock().stats.clone()
    }

    #[must_use]
    pub fn idle_duration(&self) -> Duration {
        self.binding.lock().stats.idle_duration()
    }

    /// Migration weight: subscriptions plus one point per 100 messages sent.
    #[must_use]
    pub fn load(&self) -> f64 {
        let binding = self.binding.lock();
        binding.subscriptions.len() as f64 + binding.stats.messages_sent() as f64 / 100.0
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub(super) fn mark_unhealthy(&self) {
        if self.healthy.swap(false, Ordering::AcqRel) {
            debug!(connection_id = %self.id, pool = %self.pool_name, "Connection marked unhealthy");
        }
    }

    /// Healthy and below the subscription cap.
    pub(super) fn is_usable(&self, max_subscriptions: usize) -> bool {
        self.is_healthy() && self.subscription_count() < max_subscriptions
    }

    /// Rebind to a client. `metadata` replaces the existing map when given.
    pub(super) fn bind(&self, client_id: ClientId, metadata: Option<Metadata>) {
        let mut binding = self.binding.lock();
        binding.client_id = client_id;
        if let Some(metadata) = metadata {
            binding.metadata = metadata;
        }
    }

    pub(super) fn add_subscription(&self, topic: Topic) -> bool {
        self.binding.lock().subscriptions.insert(topic)
    }

    pub(super) fn remove_subscription(&self, topic: &Topic) -> bool {
        self.binding.lock().subscriptions.remove(topic)
    }

    /// Record an inbound message. Counts as activity for idle tracking.
    pub fn record_receive(&self, bytes_len: usize) {
        self.binding.lock().stats.record_receive(bytes_len);
    }

    /// Route the transport's inbound frames into this connection's stats.
    pub(super) fn observe_inbound(self: &Arc<Self>) {
        let conn = Arc::downgrade(self);
        self.handle.on_receive(Arc::new(move |bytes_len| {
            if let Some(conn) = conn.upgrade() {
                conn.record_receive(bytes_len);
            }
        }));
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns the transport failure; the connection is marked unhealthy and
    /// its error counter incremented.
    pub async fn send(&self, message: &str) -> Result<(), TransportError> {
        match self.handle.send(message).await {
            Ok(()) => {
                self.binding.lock().stats.record_send(message.len());
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Round-trip a ping and record its latency.
    ///
    /// Does not count as activity for idle tracking.
    ///
    /// # Errors
    ///
    /// Returns the transport failure; the connection is marked unhealthy.
    pub async fn ping(&self) -> Result<Duration, TransportError> {
        let started = Instant::now();
        match self.handle.ping().await {
            Ok(()) => {
                let latency = started.elapsed();
                self.binding.lock().stats.record_latency(latency);
                Ok(latency)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Best-effort close.
    pub async fn close(&self) {
        if let Err(e) = self.handle.close().await {
            debug!(connection_id = %self.id, error = %e, "Close failed");
        }
    }

    fn fail(&self, err: &TransportError) {
        warn!(connection_id = %self.id, error = %err, "Connection operation failed");
        self.binding.lock().stats.record_error();
        self.mark_unhealthy();
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("pool_name", &self.pool_name)
            .field("healthy", &self.is_healthy())
            .finish_non_exhaustive()
    }
}
