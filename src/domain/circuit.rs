//! Circuit breaker guarding connection acquisition.
//!
//! Three states:
//! - Closed: normal operation, calls are allowed
//! - Open: too many consecutive failures, calls are rejected
//! - HalfOpen: recovery timeout elapsed, trial calls pass through
//!
//! ```text
//! Closed   -> Open:     failure_count >= failure_threshold
//! Open     -> HalfOpen: recovery_timeout elapsed since last failure
//! HalfOpen -> Closed:   any recorded success
//! HalfOpen -> Open:     any recorded failure
//! ```
//!
//! The breaker is a plain synchronous state machine. The pool keeps it behind
//! the same mutex as the connection registry.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Stable name used in logs and snapshots.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open after the last failure.
    pub recovery_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    trips: u64,
}

impl CircuitBreaker {
    #[must_use]
    pub const fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            trips: 0,
        }
    }

    /// Check whether a call may proceed, moving Open -> HalfOpen once the
    /// recovery timeout has elapsed.
    pub fn call_allowed(&mut self) -> bool {
        self.call_allowed_at(Instant::now())
    }

    /// [`call_allowed`](Self::call_allowed) evaluated at a given instant.
    pub fn call_allowed_at(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovered = self.last_failure_at.is_some_and(|at| {
                    now.saturating_duration_since(at) >= self.settings.recovery_timeout
                });
                if recovered {
                    info!("Circuit breaker recovery timeout elapsed, allowing trial call");
                    self.state = CircuitState::HalfOpen;
                }
                recovered
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!(state = %self.state, "Circuit breaker closed after successful call");
        }
        self.failure_count = 0;
        self.state = CircuitState::Closed;
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    /// [`record_failure`](Self::record_failure) stamped with a given instant.
    pub fn record_failure_at(&mut self, now: Instant) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_at = Some(now);

        if self.failure_count >= self.settings.failure_threshold
            && self.state != CircuitState::Open
        {
            self.state = CircuitState::Open;
            self.trips += 1;
            warn!(
                failures = self.failure_count,
                recovery_secs = self.settings.recovery_timeout.as_secs(),
                "Circuit breaker opened"
            );
        }
    }

    /// Force the breaker back to Closed with a zeroed counter.
    pub fn reset(&mut self) {
        self.failure_count = 0;
        self.last_failure_at = None;
        self.state = CircuitState::Closed;
    }

    #[must_use]
    pub const fn state(&self) -> CircuitState {
        self.state
    }

    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Number of Closed/HalfOpen -> Open transitions so far.
    #[must_use]
    pub const fn trips(&self) -> u64 {
        self.trips
    }

    #[must_use]
    pub const fn settings(&self) -> BreakerSettings {
        self.settings
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}
