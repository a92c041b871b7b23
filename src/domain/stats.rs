//! Per-connection traffic counters and rolling latency sample.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Number of latency samples retained per connection.
pub const LATENCY_SAMPLE_CAPACITY: usize = 100;

/// Counters and timings for a single connection.
///
/// Owned by exactly one pooled connection; every mutator is O(1) and
/// infallible.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    created_at: Instant,
    opened_at: DateTime<Utc>,
    last_activity: Instant,
    messages_sent: u64,
    messages_received: u64,
    bytes_sent: u64,
    bytes_received: u64,
    errors: u64,
    reconnections: u64,
    latency_samples: VecDeque<Duration>,
}

impl ConnectionStats {
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            opened_at: Utc::now(),
            last_activity: now,
            messages_sent: 0,
            messages_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            errors: 0,
            reconnections: 0,
            latency_samples: VecDeque::with_capacity(LATENCY_SAMPLE_CAPACITY),
        }
    }

    /// Record an outbound message and mark the connection active.
    pub fn record_send(&mut self, bytes_len: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes_len as u64;
        self.touch();
    }

    /// Record an inbound message and mark the connection active.
    pub fn record_receive(&mut self, bytes_len: usize) {
        self.messages_received += 1;
        self.bytes_received += bytes_len as u64;
        self.touch();
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Push a latency sample, dropping the oldest once the buffer is full.
    pub fn record_latency(&mut self, latency: Duration) {
        if self.latency_samples.len() == LATENCY_SAMPLE_CAPACITY {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency);
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Mean of the retained latency samples in milliseconds (0 when empty).
    #[must_use]
    pub fn average_latency_ms(&self) -> f64 {
        if self.latency_samples.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .latency_samples
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .sum();
        total / self.latency_samples.len() as f64
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the last send/receive.
    #[must_use]
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    #[must_use]
    pub const fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    #[must_use]
    pub const fn messages_received(&self) -> u64 {
        self.messages_received
    }

    #[must_use]
    pub const fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    #[must_use]
    pub const fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    #[must_use]
    pub const fn errors(&self) -> u64 {
        self.errors
    }

    /// Always 0 for pooled connections: a dropped connection is evicted and
    /// replaced by a new one, never reconnected in place.
    #[must_use]
    pub const fn reconnections(&self) -> u64 {
        self.reconnections
    }

    #[must_use]
    pub fn latency_sample_count(&self) -> usize {
        self.latency_samples.len()
    }

    /// Serializable view for status output.
    #[must_use]
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            opened_at: self.opened_at,
            uptime_secs: self.uptime().as_secs(),
            idle_secs: self.idle_duration().as_secs(),
            messages_sent: self.messages_sent,
            messages_received: self.messages_received,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            errors: self.errors,
            reconnections: self.reconnections,
            average_latency_ms: self.average_latency_ms(),
        }
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub opened_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub idle_secs: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub errors: u64,
    pub reconnections: u64,
    pub average_latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_updates_counters() {
        let mut stats = ConnectionStats::new();
        stats.record_send(5);
        stats.record_send(7);
        stats.record_receive(3);

        assert_eq!(stats.messages_sent(), 2);
        assert_eq!(stats.bytes_sent(), 12);
        assert_eq!(stats.messages_received(), 1);
        assert_eq!(stats.bytes_received(), 3);
        assert_eq!(stats.errors(), 0);
    }

    #[test]
    fn average_latency_is_zero_without_samples() {
        let stats = ConnectionStats::new();
        assert_eq!(stats.average_latency_ms(), 0.0);
    }

    #[test]
    fn latency_buffer_drops_oldest_sample() {
        let mut stats = ConnectionStats::new();
        stats.record_latency(Duration::from_millis(1000));
        for _ in 0..LATENCY_SAMPLE_CAPACITY {
            stats.record_latency(Duration::from_millis(10));
        }

        assert_eq!(stats.latency_sample_count(), LATENCY_SAMPLE_CAPACITY);
        assert!((stats.average_latency_ms() - 10.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_duration_resets_on_activity() {
        let mut stats = ConnectionStats::new();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(stats.idle_duration() >= Duration::from_secs(30));

        stats.record_send(1);
        assert!(stats.idle_duration() < Duration::from_secs(1));
        assert!(stats.uptime() >= Duration::from_secs(30));
    }

    #[test]
    fn summary_reports_traffic_and_no_reconnections() {
        let mut stats = ConnectionStats::new();
        stats.record_send(2);
        stats.record_receive(8);
        stats.record_error();

        let summary = stats.summary();
        assert_eq!(summary.messages_sent, 1);
        assert_eq!(summary.bytes_received, 8);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.reconnections, 0);
    }

    #[test]
    fn errors_do_not_touch_activity() {
        let mut stats = ConnectionStats::new();
        let before = stats.last_activity;
        stats.record_error();
        assert_eq!(stats.errors(), 1);
        assert_eq!(stats.last_activity, before);
    }
}
