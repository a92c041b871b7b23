//! Pool health score.

use super::circuit::CircuitState;

/// Maximum points deducted for connection errors.
const MAX_ERROR_PENALTY: f64 = 30.0;
const BREAKER_PENALTY: f64 = 20.0;
const LOW_AVAILABILITY_PENALTY: f64 = 20.0;
const HIGH_UTILIZATION_PENALTY: f64 = 10.0;
const HIGH_UTILIZATION_RATIO: f64 = 0.9;

/// Inputs for [`health_score`].
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    pub connection_errors: u64,
    pub connections_created: u64,
    pub breaker_state: CircuitState,
    pub available_connections: usize,
    pub active_connections: usize,
    pub min_connections: usize,
    pub max_connections: usize,
}

/// Summarize pool condition as a score in `[0, 100]`.
///
/// Starts at 100 and deducts up to 30 for the lifetime error rate, 20 when
/// the breaker is not closed, 20 when fewer than half of `min_connections`
/// (at least one) are available, and 10 when more than 90% of `max_connections` are in use.
#[must_use]
pub fn health_score(inputs: &HealthInputs) -> f64 {
    let mut score = 100.0;

    let error_rate = inputs.connection_errors as f64 / inputs.connections_created.max(1) as f64;
    score -= (error_rate * 100.0).min(MAX_ERROR_PENALTY);

    if inputs.breaker_state != CircuitState::Closed {
        score -= BREAKER_PENALTY;
    }

    let availability =
        inputs.available_connections as f64 / inputs.min_connections.max(1) as f64;
    if availability < 0.5 {
        score -= LOW_AVAILABILITY_PENALTY;
    }

    if inputs.max_connections > 0 {
        let utilization = inputs.active_connections as f64 / inputs.max_connections as f64;
        if utilization > HIGH_UTILIZATION_RATIO {
            score -= HIGH_UTILIZATION_PENALTY;
        }
    }

    score.clamp(0.0, 100.0)
}
