//! Mock [`Connection`] and [`Connector`] implementations for testing.
//!
//! - [`ScriptedConnection`] pops pre-loaded send/ping results (defaults to
//!   `Ok(())` when exhausted) and refuses sends once closed. Inbound frames
//!   are injected through its [`InboundFeed`].
//! - [`ScriptedConnector`] pops pre-loaded connect results, optionally hands
//!   out prepared connections, and otherwise builds fresh ones sharing the
//!   connector's [`CallCounts`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::port::{Connection, Connector, ReceiveHook, SharedConnector};

/// Shared call counters, cloneable across connections.
#[derive(Debug, Clone, Default)]
pub struct CallCounts {
    sends: Arc<AtomicU32>,
    pings: Arc<AtomicU32>,
    closes: Arc<AtomicU32>,
}

impl CallCounts {
    pub fn sends(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Injects inbound frames into a [`ScriptedConnection`] after it has been
/// handed to the pool.
#[derive(Clone, Default)]
pub struct InboundFeed {
    hook: Arc<Mutex<Option<ReceiveHook>>>,
}

impl InboundFeed {
    /// Deliver one frame of `bytes_len` bytes. Returns `false` if nobody
    /// has registered for inbound traffic.
    pub fn deliver(&self, bytes_len: usize) -> bool {
        let Some(hook) = self.hook.lock().clone() else {
            return false;
        };
        hook(bytes_len);
        true
    }
}

// ---------------------------------------------------------------------------
// ScriptedConnection
// ---------------------------------------------------------------------------

/// A mock connection with scripted send and ping results.
pub struct ScriptedConnection {
    send_results: Mutex<VecDeque<Result<(), TransportError>>>,
    ping_results: Mutex<VecDeque<Result<(), TransportError>>>,
    sent: Arc<Mutex<Vec<String>>>,
    inbound: InboundFeed,
    counts: CallCounts,
    closed: AtomicBool,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self {
            send_results: Mutex::new(VecDeque::new()),
            ping_results: Mutex::new(VecDeque::new()),
            sent: Arc::new(Mutex::new(Vec::new())),
            inbound: InboundFeed::default(),
            counts: CallCounts::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_send_results(self, results: Vec<Result<(), TransportError>>) -> Self {
        *self.send_results.lock() = results.into();
        self
    }

    pub fn with_ping_results(self, results: Vec<Result<(), TransportError>>) -> Self {
        *self.ping_results.lock() = results.into();
        self
    }

    /// Fail the next `times` sends with `err`.
    pub fn failing_sends(self, err: TransportError, times: usize) -> Self {
        self.with_send_results(vec![Err(err); times])
    }

    /// Fail the next `times` pings with `err`.
    pub fn failing_pings(self, err: TransportError, times: usize) -> Self {
        self.with_ping_results(vec![Err(err); times])
    }

    /// Share counters with other connections.
    pub fn with_counts(mut self, counts: CallCounts) -> Self {
        self.counts = counts;
        self
    }

    pub fn counts(&self) -> CallCounts {
        self.counts.clone()
    }

    /// Handle to the log of successfully sent messages.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }

    /// Handle for injecting inbound frames.
    pub fn inbound(&self) -> InboundFeed {
        self.inbound.clone()
    }
}

impl Default for ScriptedConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&self, message: &str) -> Result<(), TransportError> {
        self.counts.sends.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let result = self.send_results.lock().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.sent.lock().push(message.to_string());
        }
        result
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.counts.pings.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.ping_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.counts.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn on_receive(&self, hook: ReceiveHook) {
        *self.inbound.hook.lock() = Some(hook);
    }
}

// ---------------------------------------------------------------------------
// ScriptedConnector
// ---------------------------------------------------------------------------

/// A mock connector with scripted connect results.
///
/// Each `connect()` pops the next result (defaults to `Ok(())`); on success
/// it hands out the next prepared connection, or a fresh
/// [`ScriptedConnection`] sharing this connector's counters.
pub struct ScriptedConnector {
    connect_results: Mutex<VecDeque<Result<(), TransportError>>>,
    prepared: Mutex<VecDeque<ScriptedConnection>>,
    fail_always: Option<TransportError>,
    connect_delay: Duration,
    connect_count: Arc<AtomicU32>,
    counts: CallCounts,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            connect_results: Mutex::new(VecDeque::new()),
            prepared: Mutex::new(VecDeque::new()),
            fail_always: None,
            connect_delay: Duration::ZERO,
            connect_count: Arc::new(AtomicU32::new(0)),
            counts: CallCounts::default(),
        }
    }

    pub fn with_connect_results(self, results: Vec<Result<(), TransportError>>) -> Self {
        *self.connect_results.lock() = results.into();
        self
    }

    /// Fail every connect with `err`.
    pub fn always_failing(mut self, err: TransportError) -> Self {
        self.fail_always = Some(err);
        self
    }

    /// Hand out these connections first, in order.
    pub fn with_connections(self, connections: Vec<ScriptedConnection>) -> Self {
        *self.prepared.lock() = connections.into();
        self
    }

    /// Sleep this long inside every connect.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Shared counter of connect calls.
    pub fn connect_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.connect_count)
    }

    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Counters shared by every connection this connector builds itself.
    pub fn counts(&self) -> CallCounts {
        self.counts.clone()
    }

    pub fn shared(self) -> SharedConnector {
        Arc::new(self)
    }
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if let Some(err) = &self.fail_always {
            return Err(err.clone());
        }
        self.connect_results.lock().pop_front().unwrap_or(Ok(()))?;

        let conn = self
            .prepared
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedConnection::new().with_counts(self.counts.clone()));
        Ok(Box::new(conn))
    }
}
