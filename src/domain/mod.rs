//! Transport-agnostic pool domain: identifiers, connection statistics,
//! the circuit breaker state machine, and the health score.

mod health;
mod id;
mod stats;

pub mod circuit;

pub use circuit::{BreakerSettings, CircuitBreaker, CircuitState};
pub use health::{health_score, HealthInputs};
pub use id::{ClientId, ConnectionId, Topic};
pub use stats::{ConnectionStats, StatsSummary, LATENCY_SAMPLE_CAPACITY};

/// Free-form key/value metadata attached to a connection by its client.
pub type Metadata = std::collections::HashMap<String, String>;
