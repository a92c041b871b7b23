//! Outbound adapters.

pub mod websocket;

pub use websocket::{WebSocketConnection, WebSocketConnector};
