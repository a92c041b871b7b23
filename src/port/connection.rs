//! Connection port.
//!
//! These traits are the only thing the pool knows about the wire. A
//! transport adapter implements [`Connector`] to open physical connections
//! and [`Connection`] for the send/ping/close capability. Inbound traffic
//! is reported back through a [`ReceiveHook`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;

/// Called with the payload size of every inbound data frame.
pub type ReceiveHook = Arc<dyn Fn(usize) + Send + Sync>;

/// A persistent, bidirectional channel that may fail at any time.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Deliver one message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the peer is gone, or another
    /// variant for transient failures.
    async fn send(&self, message: &str) -> Result<(), TransportError>;

    /// Liveness check. Resolves once the peer has answered.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection cannot carry traffic, or
    /// [`TransportError::Timeout`] when the peer does not answer in time.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails; callers treat this as
    /// best-effort.
    async fn close(&self) -> Result<(), TransportError>;

    /// Install the callback for inbound data frames, replacing any earlier
    /// one. Send-only transports keep the default, which drops it.
    fn on_receive(&self, hook: ReceiveHook) {
        drop(hook);
    }
}

/// Opens new physical connections on demand.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open one connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}

/// Shared connector handed to the pool.
pub type SharedConnector = Arc<dyn Connector>;
