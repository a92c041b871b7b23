//! Connection pool registry.
//!
//! Everything here is mutated under the single pool lock. Methods are
//! synchronous; callers drop the guard before awaiting anything.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::connection::PooledConnection;
use crate::domain::{BreakerSettings, CircuitBreaker, ClientId, ConnectionId, Topic};
use crate::error::PoolError;

/// Lifetime counters for the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolCounters {
    /// Physical connections opened.
    pub connections_created: u64,
    /// Physical connections evicted or drained.
    pub connections_closed: u64,
    /// Broadcast deliveries that succeeded.
    pub messages_sent: u64,
    /// Failed acquisitions.
    pub connection_errors: u64,
}

pub(super) struct Registry {
    pub(super) connections: HashMap<ConnectionId, Arc<PooledConnection>>,
    /// Client -> connection ids in acquisition order.
    pub(super) clients: HashMap<ClientId, Vec<ConnectionId>>,
    pub(super) available: VecDeque<ConnectionId>,
    pub(super) topics: HashMap<Topic, HashSet<ConnectionId>>,
    /// Connections being opened outside the lock.
    pub(super) pending: usize,
    pub(super) breaker: CircuitBreaker,
    pub(super) counters: PoolCounters,
    pub(super) closed: bool,
}

impl Registry {
    pub(super) fn new(breaker: BreakerSettings) -> Self {
        Self {
            connections: HashMap::new(),
            clients: HashMap::new(),
            available: VecDeque::new(),
            topics: HashMap::new(),
            pending: 0,
            breaker: CircuitBreaker::new(breaker),
            counters: PoolCounters::default(),
            closed: false,
        }
    }

    pub(super) fn get(&self, id: &ConnectionId) -> Option<Arc<PooledConnection>> {
        self.connections.get(id).cloned()
    }

    /// Reserve a slot for a connection about to be opened.
    pub(super) fn reserve(&mut self, max: usize) -> Result<(), PoolError> {
        if self.connections.len() + self.pending >= max {
            return Err(PoolError::Exhausted { max });
        }
        self.pending += 1;
        Ok(())
    }

    /// Reserve up to `wanted` slots without exceeding `max`; returns how many.
    pub(super) fn reserve_up_to(&mut self, wanted: usize, max: usize) -> usize {
        let room = max.saturating_sub(self.connections.len() + self.pending);
        let granted = wanted.min(room);
        self.pending += granted;
        granted
    }

    pub(super) fn cancel_reservation(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    /// Turn a reservation into a registered connection.
    pub(super) fn commit(&mut self, conn: Arc<PooledConnection>) {
        self.cancel_reservation();
        self.counters.connections_created += 1;
        self.connections.insert(conn.id(), conn);
    }

    /// Append `id` to the client's list unless already present.
    pub(super) fn bind_client(&mut self, client_id: &ClientId, id: ConnectionId) {
        let ids = self.clients.entry(client_id.clone()).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Queue `id` for reuse unless already queued.
    pub(super) fn enqueue(&mut self, id: ConnectionId) {
        if !self.available.contains(&id) {
            self.available.push_back(id);
        }
    }

    pub(super) fn dequeue(&mut self, id: &ConnectionId) {
        self.available.retain(|queued| queued != id);
    }

    /// First queued connection that is healthy and under the cap, left queued.
    pub(super) fn peek_usable(&self, max_subscriptions: usize) -> Option<Arc<PooledConnection>> {
        self.available
            .iter()
            .filter_map(|id| self.connections.get(id))
            .find(|conn| conn.is_usable(max_subscriptions))
            .cloned()
    }

    /// Pop queued ids until a usable one turns up. Unusable ids are dropped
    /// from the queue on the way.
    pub(super) fn pop_usable(&mut self, max_subscriptions: usize) -> Option<Arc<PooledConnection>> {
        while let Some(id) = self.available.pop_front() {
            if let Some(conn) = self.connections.get(&id) {
                if conn.is_usable(max_subscriptions) {
                    return Some(Arc::clone(conn));
                }
            }
        }
        None
    }

    /// The client's first healthy connection under the cap.
    pub(super) fn client_usable(
        &self,
        client_id: &ClientId,
        max_subscriptions: usize,
    ) -> Option<Arc<PooledConnection>> {
        self.clients
            .get(client_id)?
            .iter()
            .filter_map(|id| self.connections.get(id))
            .find(|conn| conn.is_usable(max_subscriptions))
            .cloned()
    }

    /// The client's healthy connection with the lowest load.
    pub(super) fn least_loaded(&self, client_id: &ClientId) -> Option<Arc<PooledConnection>> {
        self.clients
            .get(client_id)?
            .iter()
            .filter_map(|id| self.connections.get(id))
            .filter(|conn| conn.is_healthy())
            .map(|conn| (conn.load(), conn))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, conn)| Arc::clone(conn))
    }

    pub(super) fn client_connection_count(&self, client_id: &ClientId) -> usize {
        self.clients.get(client_id).map_or(0, Vec::len)
    }

    /// Remove `id` from the registry and every index.
    ///
    /// The caller closes the returned connection after dropping the lock.
    pub(super) fn evict(&mut self, id: &ConnectionId) -> Option<Arc<PooledConnection>> {
        let conn = self.connections.remove(id)?;

        self.clients.retain(|_, ids| {
            ids.retain(|held| held != id);
            !ids.is_empty()
        });
        self.dequeue(id);
        for topic in conn.subscriptions() {
            if let Some(members) = self.topics.get_mut(&topic) {
                members.remove(id);
                if members.is_empty() {
                    self.topics.remove(&topic);
                }
            }
        }

        self.counters.connections_closed += 1;
        debug!(connection_id = %id, "Connection evicted");
        Some(conn)
    }

    /// Drop topic and client entries that no longer reference anything.
    ///
    /// Returns `(topics_removed, clients_removed)`.
    pub(super) fn prune_empty(&mut self) -> (usize, usize) {
        let topics_before = self.topics.len();
        self.topics.retain(|_, members| !members.is_empty());
        let clients_before = self.clients.len();
        self.clients.retain(|_, ids| !ids.is_empty());
        (
            topics_before - self.topics.len(),
            clients_before - self.clients.len(),
        )
    }

    /// Empty the registry and every index, returning the connections.
    pub(super) fn drain(&mut self) -> Vec<Arc<PooledConnection>> {
        self.clients.clear();
        self.available.clear();
        self.topics.clear();
        let drained: Vec<_> = self.connections.drain().map(|(_, conn)| conn).collect();
        self.counters.connections_closed += drained.len() as u64;
        drained
    }

    /// True when `id` is referenced by the client, queue or topic indices.
    #[cfg(test)]
    pub(super) fn is_indexed(&self, id: &ConnectionId) -> bool {
        self.available.contains(id)
            || self.clients.values().any(|ids| ids.contains(id))
            || self.topics.values().any(|members| members.contains(id))
    }
}
