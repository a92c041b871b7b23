//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`connection`] - Mock [`Connection`](crate::port::Connection) and
//!   [`Connector`](crate::port::Connector) implementations:
//!   `ScriptedConnection`, `ScriptedConnector`.
//! - [`config`] - Canonical test pool settings.

pub mod config;
pub mod connection;
