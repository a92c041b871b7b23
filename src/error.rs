use thiserror::Error;

use crate::domain::ClientId;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Failures reported by a physical connection.
///
/// `Closed` is the hard signal: the peer is gone and retrying is pointless.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// True when the peer closed the connection.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed,
            WsError::Io(e) => Self::Io(e.to_string()),
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Connection pool errors surfaced to callers of `acquire`.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("circuit breaker is open")]
    BreakerOpen,

    #[error("connection pool limit reached ({max} connections)")]
    Exhausted { max: usize },

    #[error("no suitable connection to migrate client {client_id} to")]
    MigrationUnavailable { client_id: ClientId },

    #[error("failed to open connection: {0}")]
    Connect(#[source] TransportError),

    #[error("connection pool is shut down")]
    ShutDown,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::Error as WsError;

    #[test]
    fn closed_websocket_errors_map_to_closed() {
        assert!(TransportError::from(WsError::ConnectionClosed).is_closed());
        assert!(TransportError::from(WsError::AlreadyClosed).is_closed());
    }

    #[test]
    fn io_websocket_errors_are_not_hard_close() {
        let err = WsError::Io(std::io::Error::other("reset"));
        let mapped = TransportError::from(err);
        assert!(!mapped.is_closed());
        assert!(matches!(mapped, TransportError::Io(_)));
    }

    #[test]
    fn pool_errors_render_context() {
        let err: Error = PoolError::Exhausted { max: 5 }.into();
        assert_eq!(err.to_string(), "connection pool limit reached (5 connections)");

        let err: Error = PoolError::MigrationUnavailable {
            client_id: ClientId::from("c1"),
        }
        .into();
        assert!(err.to_string().contains("c1"));
    }
}
