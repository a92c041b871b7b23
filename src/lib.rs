//! wsmux - persistent-connection pool with multiplexing.
//!
//! Many logical clients share a bounded set of long-lived connections. The
//! pool opens connections on demand, reuses them across clients, migrates a
//! client that is at its per-client limit onto its least-loaded connection,
//! and keeps a floor of idle reserve connections warm.
//!
//! # Architecture
//!
//! - [`domain`] - Identifiers, per-connection statistics, the circuit breaker
//!   state machine and the health score
//! - [`port`] - `Connector` / `Connection` traits the pool dials through
//! - [`infrastructure::pool`] - The [`ConnectionPool`] itself: acquisition,
//!   subscriptions, broadcast, supervisors and snapshots
//! - [`infrastructure::config`] - TOML configuration with environment overrides
//! - [`adapter`] - WebSocket transport and the `wsmux` CLI
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wsmux::adapter::outbound::WebSocketConnector;
//! use wsmux::infrastructure::config::Config;
//! use wsmux::ConnectionPool;
//!
//! # async fn demo() -> wsmux::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! let connector = WebSocketConnector::from_config(&config)?;
//! let pool = ConnectionPool::new(config.pool_settings(), Arc::new(connector))?;
//! pool.initialize().await?;
//!
//! let lease = pool.acquire("client-1", Default::default()).await?;
//! pool.subscribe(lease.id(), "prices");
//! let report = pool.broadcast("{\"op\":\"ping\"}", None, None).await?;
//! assert_eq!(report.failed, 0);
//!
//! lease.release().await;
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::{Error, Result};
pub use infrastructure::pool::{ConnectionLease, ConnectionPool, PoolSnapshot};
