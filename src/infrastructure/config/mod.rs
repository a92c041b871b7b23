//! Infrastructure configuration modules.

pub mod logging;
pub mod pool;
pub mod settings;

pub use logging::LoggingConfig;
pub use pool::{CircuitBreakerConfig, PoolConfig};
pub use settings::{Config, UpstreamConfig};
