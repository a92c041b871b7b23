//! WebSocket transport for the connection pool.
//!
//! [`WebSocketConnector`] dials the upstream URL with `connect_async` and
//! splits the stream: the write half backs [`Connection::send`] /
//! [`Connection::ping`], the read half is drained by a background task that
//! reports inbound frames, wakes pings waiting on a pong, and notices when
//! the peer goes away.
//!
//! # Connection Lifecycle
//!
//! 1. **Connect**: TCP + TLS (for `wss://`) + WebSocket handshake under
//!    `connect_timeout`
//! 2. **Read loop**: feeds data frames to the [`ReceiveHook`] and pongs to
//!    waiting pings, until a close frame or read error
//! 3. **Ping**: sends a Ping frame and waits up to `ping_timeout` for a pong
//! 4. **Close**: sends a close frame and stops the read loop
//!
//! Once the read loop has seen the peer close, every `send` and `ping`
//! returns [`TransportError::Closed`] without touching the socket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use crate::error::{Result, TransportError};
use crate::infrastructure::config::Config;
use crate::port::{Connection, Connector, ReceiveHook};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a ping waits for its pong unless configured otherwise.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections to one upstream URL.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    connect_timeout: Duration,
    ping_timeout: Duration,
}

impl WebSocketConnector {
    #[must_use]
    pub const fn new(url: Url, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    /// Wait at most `timeout` for each pong.
    #[must_use]
    pub const fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Build from the `[upstream]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream URL is missing or malformed.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(
            Self::new(config.upstream_url()?, config.upstream.connect_timeout())
                .with_ping_timeout(config.upstream.ping_timeout()),
        )
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> std::result::Result<Box<dyn Connection>, TransportError> {
        debug!(url = %self.url, "Connecting to WebSocket");

        let (stream, response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| TransportError::Timeout(self.connect_timeout))??;

        info!(url = %self.url, status = %response.status(), "WebSocket connected");

        let (sink, stream) = stream.split();
        let link = Arc::new(LinkState::default());
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&link)));

        Ok(Box::new(WebSocketConnection {
            sink: Mutex::new(sink),
            link,
            reader,
            ping_timeout: self.ping_timeout,
        }))
    }
}

#[derive(Default)]
struct LinkState {
    closed: AtomicBool,
    frames_received: AtomicU64,
    pong: Notify,
    on_receive: parking_lot::Mutex<Option<ReceiveHook>>,
}

impl LinkState {
    fn received(&self, bytes_len: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        let hook = self.on_receive.lock().clone();
        if let Some(hook) = hook {
            hook(bytes_len);
        }
    }
}

/// Drain inbound frames until the peer closes or the socket errors.
async fn read_loop(mut stream: SplitStream<WsStream>, link: Arc<LinkState>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(frame)) => {
                debug!(frame = ?frame, "Peer closed WebSocket");
                break;
            }
            Ok(Message::Text(text)) => link.received(text.len()),
            Ok(Message::Binary(data)) => link.received(data.len()),
            Ok(Message::Pong(_)) => link.pong.notify_waiters(),
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "WebSocket read failed");
                break;
            }
        }
    }
    link.closed.store(true, Ordering::Release);
    // Pings still waiting observe the close instead of timing out.
    link.pong.notify_waiters();
}

/// One live WebSocket.
pub struct WebSocketConnection {
    sink: Mutex<SplitSink<WsStream, Message>>,
    link: Arc<LinkState>,
    reader: JoinHandle<()>,
    ping_timeout: Duration,
}

impl WebSocketConnection {
    fn ensure_open(&self) -> std::result::Result<(), TransportError> {
        if self.link.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn write(&self, message: Message) -> std::result::Result<(), TransportError> {
        self.ensure_open()?;
        self.sink.lock().await.send(message).await?;
        Ok(())
    }

    /// Data frames received from the peer so far.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.link.frames_received.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&self, message: &str) -> std::result::Result<(), TransportError> {
        self.write(Message::Text(message.to_string())).await
    }

    async fn ping(&self) -> std::result::Result<(), TransportError> {
        // Register before sending so a fast pong is not missed.
        let pong = self.link.pong.notified();
        tokio::pin!(pong);
        pong.as_mut().enable();

        self.write(Message::Ping(Vec::new())).await?;
        tokio::time::timeout(self.ping_timeout, pong)
            .await
            .map_err(|_| TransportError::Timeout(self.ping_timeout))?;
        self.ensure_open()
    }

    async fn close(&self) -> std::result::Result<(), TransportError> {
        let already_closed = self.link.closed.swap(true, Ordering::AcqRel);
        let result = if already_closed {
            Ok(())
        } else {
            self.sink.lock().await.close().await.map_err(TransportError::from)
        };
        self.reader.abort();
        debug!(frames_received = self.frames_received(), "WebSocket closed");
        result
    }

    fn on_receive(&self, hook: ReceiveHook) {
        *self.link.on_receive.lock() = Some(hook);
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn local_url(listener: &TcpListener) -> Url {
        let addr = listener.local_addr().unwrap();
        Url::parse(&format!("ws://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn sends_text_frames_to_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = local_url(&listener).await;

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return text,
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected frame: {other:?}"),
                }
            }
        });

        let connector = WebSocketConnector::new(url, Duration::from_secs(5));
        let conn = connector.connect().await.unwrap();
        conn.send("hello").await.unwrap();

        assert_eq!(server.await.unwrap(), "hello");
        conn.close().await.ok();
    }

    #[tokio::test]
    async fn send_after_close_is_closed_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = local_url(&listener).await;

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let conn = WebSocketConnector::new(url, Duration::from_secs(5))
            .connect()
            .await
            .unwrap();
        conn.close().await.unwrap();

        assert_eq!(conn.send("late").await, Err(TransportError::Closed));
        assert_eq!(conn.ping().await, Err(TransportError::Closed));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn ping_resolves_on_pong() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = local_url(&listener).await;

        // Reading is enough: tungstenite answers pings while polling.
        let _server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let conn = WebSocketConnector::new(url, Duration::from_secs(5))
            .with_ping_timeout(Duration::from_secs(5))
            .connect()
            .await
            .unwrap();
        assert_eq!(conn.ping().await, Ok(()));
        assert_eq!(conn.ping().await, Ok(()));
        conn.close().await.ok();
    }

    #[tokio::test]
    async fn ping_times_out_without_pong() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = local_url(&listener).await;

        // Complete the handshake, then never read, so no pong is sent.
        let _server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            std::future::pending::<()>().await;
        });

        let timeout = Duration::from_millis(200);
        let conn = WebSocketConnector::new(url, Duration::from_secs(5))
            .with_ping_timeout(timeout)
            .connect()
            .await
            .unwrap();
        assert_eq!(conn.ping().await, Err(TransportError::Timeout(timeout)));
    }

    #[tokio::test]
    async fn inbound_frames_reach_receive_hook() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = local_url(&listener).await;

        let _server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            // Wait for the client to register its hook.
            while let Some(Ok(frame)) = ws.next().await {
                if matches!(frame, Message::Text(_)) {
                    break;
                }
            }
            ws.send(Message::Text("abc".into())).await.unwrap();
            ws.send(Message::Binary(vec![0; 4])).await.unwrap();
            std::future::pending::<()>().await;
        });

        let conn = WebSocketConnector::new(url, Duration::from_secs(5))
            .connect()
            .await
            .unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        conn.on_receive(Arc::new(move |bytes_len| {
            let _ = tx.send(bytes_len);
        }));
        conn.send("ready").await.unwrap();

        let mut sizes = Vec::new();
        for _ in 0..2 {
            let size = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            sizes.push(size);
        }
        assert_eq!(sizes, vec![3, 4]);
        conn.close().await.ok();
    }

    #[tokio::test]
    async fn handshake_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = local_url(&listener).await;

        // Accept TCP but never answer the handshake.
        let _server = tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let timeout = Duration::from_millis(100);
        let result = WebSocketConnector::new(url, timeout).connect().await;
        assert!(matches!(result, Err(TransportError::Timeout(t)) if t == timeout));
    }
}
