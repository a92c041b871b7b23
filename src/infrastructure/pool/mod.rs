//! Persistent-connection pool.
//!
//! Multiplexes logical client sessions over a bounded set of long-lived
//! connections opened through a [`Connector`](crate::port::Connector).
//!
//! # Architecture
//!
//! All shared state lives in one [`Registry`](state::Registry) behind a
//! `parking_lot::Mutex`: the connection map, the per-client index, the FIFO
//! queue of reusable connections, the topic index, the circuit breaker and
//! the lifetime counters. The lock is only held for synchronous bookkeeping;
//! connecting, sending, pinging and closing all happen outside it.
//!
//! Opening a connection is split in three steps so the cap on physical
//! connections holds under concurrency:
//!
//! 1. reserve a slot under the lock (fails with `Exhausted` at the cap)
//! 2. connect with the lock released
//! 3. commit the connection under the lock
//!
//! Three background supervisors run once the pool is initialized:
//! - **Health check**: pings every connection and evicts dead or idle ones
//! - **Cleanup**: prunes empty index entries
//! - **Stats**: logs a [`PoolSnapshot`] and resets the breaker when healthy
//!
//! Each supervisor holds a weak handle and stops once the pool is dropped.
//! After any eviction the pool tops itself back up to `min_connections`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{ClientId, ConnectionId, Metadata, Topic};
use crate::error::{PoolError, Result};
use crate::port::SharedConnector;

mod broadcast;
mod connection;
mod lease;
mod settings;
mod snapshot;
mod state;
mod supervise;

pub use broadcast::DeliveryReport;
pub use connection::PooledConnection;
pub use lease::ConnectionLease;
pub use settings::{PoolSettings, SendRetry};
pub use snapshot::PoolSnapshot;
pub use state::PoolCounters;

use state::Registry;

/// Metadata key marking connections opened to satisfy `min_connections`.
pub const RESERVED_METADATA_KEY: &str = "type";
/// Value stored under [`RESERVED_METADATA_KEY`] for reserve connections.
pub const RESERVED_METADATA_VALUE: &str = "reserved";

/// Handle to a connection pool.
///
/// Cloning is cheap and every clone refers to the same pool. Nothing is
/// opened until [`initialize`](Self::initialize) is called.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    settings: PoolSettings,
    name: Arc<str>,
    connector: SharedConnector,
    registry: Mutex<Registry>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl ConnectionPool {
    /// Create a pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid; see
    /// [`PoolSettings::validate`].
    #[must_use = "returns Result that must be checked"]
    pub fn new(settings: PoolSettings, connector: SharedConnector) -> Result<Self> {
        settings.validate()?;

        let registry = Registry::new(settings.breaker);
        Ok(Self {
            inner: Arc::new(PoolInner {
                name: Arc::from(settings.name.as_str()),
                settings,
                connector,
                registry: Mutex::new(registry),
                supervisors: Mutex::new(Vec::new()),
                initialized: AtomicBool::new(false),
            }),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    /// Start the supervisors and open `min_connections` connections.
    ///
    /// Calling it again is a no-op. Connection failures while seeding are
    /// logged and tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] if the pool was shut down.
    pub async fn initialize(&self) -> Result<()> {
        if self.inner.registry.lock().closed {
            return Err(PoolError::ShutDown.into());
        }
        if self.inner.initialized.swap(true, Ordering::AcqRel) {
            debug!(pool = %self.inner.name, "Pool already initialized");
            return Ok(());
        }

        let handles = supervise::spawn_all(&self.inner);
        self.inner.supervisors.lock().extend(handles);
        self.inner.ensure_minimum().await;

        info!(
            pool = %self.inner.name,
            min_connections = self.inner.settings.min_connections,
            max_connections = self.inner.settings.max_connections,
            multiplexing = self.inner.settings.enable_multiplexing,
            active = self.inner.registry.lock().connections.len(),
            "Connection pool initialized"
        );
        Ok(())
    }

    /// Stop the supervisors and close every connection.
    ///
    /// Idempotent. Later operations fail with [`PoolError::ShutDown`].
    pub async fn shutdown(&self) {
        {
            let mut registry = self.inner.registry.lock();
            if registry.closed {
                return;
            }
            registry.closed = true;
        }

        let handles = std::mem::take(&mut *self.inner.supervisors.lock());
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            // Cancellation is the expected outcome.
            let _ = handle.await;
        }

        let drained = self.inner.registry.lock().drain();
        let count = drained.len();
        join_all(drained.iter().map(|conn| conn.close())).await;

        info!(pool = %self.inner.name, closed = count, "Connection pool shut down");
    }

    /// True once [`shutdown`](Self::shutdown) has started.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.registry.lock().closed
    }

    /// Acquire a connection for `client_id`.
    ///
    /// The returned lease releases the connection when dropped or when
    /// [`ConnectionLease::release`] is awaited.
    ///
    /// # Errors
    ///
    /// - [`PoolError::BreakerOpen`] while the circuit breaker rejects calls
    /// - [`PoolError::MigrationUnavailable`] if the client is at its
    ///   connection limit and none of its connections is healthy
    /// - [`PoolError::Exhausted`] if a new connection would exceed
    ///   `max_connections`
    /// - [`PoolError::Connect`] if opening a connection fails
    /// - [`PoolError::ShutDown`] after shutdown
    ///
    /// Every error except `BreakerOpen` and `ShutDown` counts as a breaker
    /// failure.
    pub async fn acquire(
        &self,
        client_id: impl Into<ClientId>,
        metadata: Metadata,
    ) -> Result<ConnectionLease> {
        let client_id = client_id.into();
        let result = self.inner.acquire_connection(&client_id, metadata).await;

        let mut registry = self.inner.registry.lock();
        match result {
            Ok(conn) => {
                registry.breaker.record_success();
                drop(registry);
                Ok(ConnectionLease::new(conn, Arc::downgrade(&self.inner)))
            }
            Err(err @ (PoolError::BreakerOpen | PoolError::ShutDown)) => Err(err.into()),
            Err(err) => {
                registry.breaker.record_failure();
                registry.counters.connection_errors += 1;
                let breaker = registry.breaker.state();
                drop(registry);
                warn!(client_id = %client_id, error = %err, breaker = %breaker, "Failed to acquire connection");
                Err(err.into())
            }
        }
    }

    /// Subscribe a connection to `topic`.
    ///
    /// Returns `true` if the subscription is new. Unknown connection ids are
    /// ignored. A connection that reaches the subscription cap leaves the
    /// reuse queue.
    pub fn subscribe(&self, connection_id: ConnectionId, topic: impl Into<Topic>) -> bool {
        let topic = topic.into();
        let mut registry = self.inner.registry.lock();
        let Some(conn) = registry.get(&connection_id) else {
            debug!(connection_id = %connection_id, topic = %topic, "Subscribe for unknown connection ignored");
            return false;
        };

        let added = conn.add_subscription(topic.clone());
        registry
            .topics
            .entry(topic.clone())
            .or_default()
            .insert(connection_id);
        if conn.subscription_count() >= self.inner.settings.max_subscriptions_per_connection {
            registry.dequeue(&connection_id);
        }

        debug!(connection_id = %connection_id, topic = %topic, added, "Subscribed");
        added
    }

    /// Remove a subscription. Returns `true` if the connection was subscribed.
    pub fn unsubscribe(&self, connection_id: ConnectionId, topic: &Topic) -> bool {
        let mut registry = self.inner.registry.lock();
        let Some(conn) = registry.get(&connection_id) else {
            return false;
        };

        let removed = conn.remove_subscription(topic);
        if let Some(members) = registry.topics.get_mut(topic) {
            members.remove(&connection_id);
        }

        debug!(connection_id = %connection_id, topic = %topic, removed, "Unsubscribed");
        removed
    }

    /// Look up a registered connection.
    #[must_use]
    pub fn connection(&self, connection_id: &ConnectionId) -> Option<Arc<PooledConnection>> {
        self.inner.registry.lock().get(connection_id)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.inner.registry.lock().connections.len()
    }

    /// Run one health-check sweep now.
    pub async fn run_health_check(&self) {
        self.inner.run_health_check().await;
    }

    /// Run one cleanup sweep now.
    pub async fn run_cleanup(&self) {
        self.inner.run_cleanup().await;
    }

    /// Log a snapshot now and reset an open breaker if the pool is healthy.
    pub fn report_stats(&self) -> PoolSnapshot {
        self.inner.report_stats()
    }

    /// Open connections until `min_connections` are registered.
    pub async fn ensure_minimum_connections(&self) {
        self.inner.ensure_minimum().await;
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.inner.name)
            .field("active", &self.active_connections())
            .finish_non_exhaustive()
    }
}

/// A slot counted against `max_connections` while a connection is opened.
///
/// Dropping it unused gives the slot back.
struct SlotReservation<'a> {
    pool: &'a PoolInner,
    armed: bool,
}

impl<'a> SlotReservation<'a> {
    /// Wrap a slot already counted in `Registry::pending`.
    const fn new(pool: &'a PoolInner) -> Self {
        Self { pool, armed: true }
    }

    /// Hand the slot over to the caller, who settles it under the lock.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.registry.lock().cancel_reservation();
        }
    }
}

impl PoolInner {
    async fn acquire_connection(
        &self,
        client_id: &ClientId,
        metadata: Metadata,
    ) -> std::result::Result<Arc<PooledConnection>, PoolError> {
        let cap = self.settings.max_subscriptions_per_connection;
        {
            let mut registry = self.registry.lock();
            if registry.closed {
                return Err(PoolError::ShutDown);
            }
            if !registry.breaker.call_allowed() {
                return Err(PoolError::BreakerOpen);
            }

            if self.settings.enable_multiplexing {
                if let Some(conn) = registry.client_usable(client_id, cap) {
                    debug!(connection_id = %conn.id(), client_id = %client_id, "Reusing client connection");
                    return Ok(conn);
                }
                if let Some(conn) = registry.peek_usable(cap) {
                    // A client at its limit shares the connection without owning it.
                    if registry.client_connection_count(client_id)
                        < self.settings.max_connections_per_client
                    {
                        conn.bind(client_id.clone(), Some(metadata));
                        registry.bind_client(client_id, conn.id());
                    }
                    debug!(connection_id = %conn.id(), client_id = %client_id, "Sharing available connection");
                    return Ok(conn);
                }
            }

            if registry.client_connection_count(client_id)
                >= self.settings.max_connections_per_client
            {
                return match registry.least_loaded(client_id) {
                    Some(conn) => {
                        info!(connection_id = %conn.id(), client_id = %client_id, "Client at connection limit, migrating to least loaded");
                        Ok(conn)
                    }
                    None => Err(PoolError::MigrationUnavailable {
                        client_id: client_id.clone(),
                    }),
                };
            }

            if let Some(conn) = registry.pop_usable(cap) {
                conn.bind(client_id.clone(), Some(metadata));
                registry.bind_client(client_id, conn.id());
                debug!(connection_id = %conn.id(), client_id = %client_id, "Assigned available connection");
                return Ok(conn);
            }

            registry.reserve(self.settings.max_connections)?;
        }

        let slot = SlotReservation::new(self);
        let owner = client_id.clone();
        self.open(slot, client_id.clone(), metadata, move |registry, conn| {
            registry.bind_client(&owner, conn.id());
        })
        .await
    }

    /// Open one connection for a reserved slot and register it.
    ///
    /// `place` runs under the lock right after the connection is registered.
    async fn open<F>(
        &self,
        slot: SlotReservation<'_>,
        client_id: ClientId,
        metadata: Metadata,
        place: F,
    ) -> std::result::Result<Arc<PooledConnection>, PoolError>
    where
        F: FnOnce(&mut Registry, &PooledConnection),
    {
        let handle = self.connector.connect().await.map_err(PoolError::Connect)?;
        let conn = Arc::new(PooledConnection::new(
            ConnectionId::generate(),
            Arc::clone(&self.name),
            handle,
            client_id,
            metadata,
        ));
        conn.observe_inbound();

        let committed = {
            let mut registry = self.registry.lock();
            slot.disarm();
            if registry.closed {
                registry.cancel_reservation();
                false
            } else {
                registry.commit(Arc::clone(&conn));
                place(&mut registry, &conn);
                true
            }
        };
        if !committed {
            conn.close().await;
            return Err(PoolError::ShutDown);
        }

        info!(connection_id = %conn.id(), client_id = %conn.client_id(), pool = %self.name, "Created connection");
        Ok(conn)
    }

    /// Top the pool up to `min_connections`.
    ///
    /// New connections belong to the reserved client and go straight into
    /// the reuse queue. Failures are logged and tolerated.
    async fn ensure_minimum(&self) {
        let granted = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return;
            }
            let deficit = self
                .settings
                .min_connections
                .saturating_sub(registry.connections.len() + registry.pending);
            registry.reserve_up_to(deficit, self.settings.max_connections)
        };
        if granted == 0 {
            return;
        }

        info!(pool = %self.name, count = granted, "Creating connections to meet minimum");

        let reserved = ClientId::reserved();
        let opens = (0..granted).map(|_| {
            let metadata = Metadata::from([(
                RESERVED_METADATA_KEY.to_string(),
                RESERVED_METADATA_VALUE.to_string(),
            )]);
            self.open(
                SlotReservation::new(self),
                reserved.clone(),
                metadata,
                |registry, conn| registry.enqueue(conn.id()),
            )
        });

        let failed = join_all(opens)
            .await
            .into_iter()
            .filter_map(std::result::Result::err)
            .inspect(|e| warn!(pool = %self.name, error = %e, "Failed to open reserve connection"))
            .count();
        if failed > 0 {
            warn!(pool = %self.name, failed, requested = granted, "Minimum connections not fully met");
        }
    }

    /// Release bookkeeping for a leased connection.
    ///
    /// Returns the connection if it was evicted; the caller closes it with
    /// [`retire`](Self::retire).
    fn release_connection(&self, conn: &PooledConnection) -> Option<Arc<PooledConnection>> {
        let id = conn.id();
        let mut registry = self.registry.lock();
        if !registry.connections.contains_key(&id) {
            return None;
        }

        if !conn.is_healthy() {
            debug!(connection_id = %id, "Releasing unhealthy connection");
            return registry.evict(&id);
        }
        if conn.idle_duration() > self.settings.idle_timeout {
            debug!(connection_id = %id, "Releasing idle connection");
            return registry.evict(&id);
        }
        if self.settings.enable_multiplexing
            && conn.is_usable(self.settings.max_subscriptions_per_connection)
        {
            registry.enqueue(id);
        }
        None
    }

    /// Close evicted connections, then refill to the minimum.
    async fn retire(&self, evicted: Vec<Arc<PooledConnection>>) {
        for conn in &evicted {
            info!(connection_id = %conn.id(), pool = %self.name, "Removed connection");
        }
        join_all(evicted.iter().map(|conn| conn.close())).await;
        self.ensure_minimum().await;
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        for handle in self.supervisors.get_mut().drain(..) {
            handle.abort();
        }
    }
}
