//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! ```text
//!              ┌─────────────────────────┐
//!              │     ConnectionPool      │
//!              │  (domain + pool state)  │
//!              └────────────┬────────────┘
//!                           │ Connector / Connection
//!                           ▼
//!                  ┌─────────────────┐
//!                  │    Transport    │
//!                  │     Adapter     │
//!                  └─────────────────┘
//! ```
//!
//! # Available Ports
//!
//! - [`Connector`] - Opens physical connections
//! - [`Connection`] - send / ping / close on one physical connection

mod connection;

pub use connection::{Connection, Connector, ReceiveHook, SharedConnector};
