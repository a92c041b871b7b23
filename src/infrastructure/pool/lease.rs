//! Scoped connection acquisition.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tracing::debug;

use super::connection::PooledConnection;
use super::PoolInner;

/// A connection checked out of the pool.
///
/// Releasing happens exactly once: either through
/// [`release`](Self::release), which also waits for any eviction and
/// refill to finish, or on drop, which does the bookkeeping immediately and
/// hands closing and refilling to the runtime.
pub struct ConnectionLease {
    conn: Arc<PooledConnection>,
    pool: Weak<PoolInner>,
    released: bool,
}

impl ConnectionLease {
    pub(super) fn new(conn: Arc<PooledConnection>, pool: Weak<PoolInner>) -> Self {
        Self {
            conn,
            pool,
            released: false,
        }
    }

    /// Shared handle to the underlying connection.
    ///
    /// The handle stays usable after release but is no longer tracked by
    /// the lease.
    #[must_use]
    pub fn connection(&self) -> &Arc<PooledConnection> {
        &self.conn
    }

    /// Give the connection back to the pool.
    pub async fn release(mut self) {
        self.released = true;
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        if let Some(evicted) = pool.release_connection(&self.conn) {
            pool.retire(vec![evicted]).await;
        }
    }
}

impl Deref for ConnectionLease {
    type Target = PooledConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let Some(evicted) = pool.release_connection(&self.conn) else {
            return;
        };

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    pool.retire(vec![evicted]).await;
                });
            }
            Err(_) => {
                debug!(connection_id = %evicted.id(), "No runtime to close evicted connection");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("connection", &self.conn)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
