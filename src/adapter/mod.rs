//! Implementations of ports (hexagonal adapters).
//!
//! - [`inbound`] - Command-line entry points driving the pool
//! - [`outbound`] - Transports the pool drives through its ports

pub mod inbound;
pub mod outbound;
