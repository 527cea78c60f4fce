//! Pump.fun Feed Connection
//!
//! Owns the WebSocket connection to the PumpPortal feed, subscribes to
//! token creation events and keeps the stream alive across disconnects.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribing -> Streaming
//!      ^                                          |
//!      +--------------- read/write failure -------+
//!
//! any state -> Closed (on close() or cancellation)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::SubscribeMessage;
use crate::domain::metrics::{Operation, OperationMetrics};
use crate::ports::PayloadHandler;

/// Default WebSocket URL for pump.fun data
pub const DEFAULT_WS_URL: &str = "wss://pumpportal.fun/api/data";
/// Delay between reconnection attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Upper bound on sending the close frame during shutdown
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
/// Read half of an established feed connection
pub type FeedSource = SplitStream<WsStream>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection already closed")]
    AlreadyClosed,

    #[error("Connection closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribing,
    Streaming,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How long to wait before the next connection attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    /// Same delay every time, unbounded attempts
    Fixed(Duration),
    /// Doubling delay starting at `base`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            ReconnectPolicy::Fixed(delay) => *delay,
            ReconnectPolicy::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
                base.saturating_mul(factor).min(*max)
            }
        }
    }
}

/// Configuration for the feed connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
    /// Reconnect when no frame arrives for this long. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            idle_timeout: None,
        }
    }
}

/// Mutable connection state. Held only for flag flips and handle swaps,
/// never across socket I/O.
struct Shared {
    state: ConnectionState,
    sink: Option<WsSink>,
    reconnect_count: u32,
    closed: bool,
}

impl Shared {
    fn transition(&mut self, next: ConnectionState) {
        if self.state != ConnectionState::Closed {
            self.state = next;
        }
    }
}

/// Persistent, self-healing connection to the launch feed
#[derive(Clone)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    handler: Arc<dyn PayloadHandler>,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
    metrics: Arc<OperationMetrics>,
}

impl ConnectionManager {
    /// Create a manager; `cancel` is the shutdown signal shared with the
    /// rest of the process.
    pub fn new(
        config: ConnectionConfig,
        handler: Arc<dyn PayloadHandler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            handler,
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                sink: None,
                reconnect_count: 0,
                closed: false,
            })),
            cancel,
            metrics: Arc::new(OperationMetrics::new()),
        }
    }

    /// Record connection timings into an existing metrics collector
    pub fn with_metrics(mut self, metrics: Arc<OperationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.lock().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Streaming
    }

    /// Number of reconnection attempts scheduled so far
    pub async fn reconnect_count(&self) -> u32 {
        self.shared.lock().await.reconnect_count
    }

    /// Open the transport. Leaves the manager in `Connecting` on failure.
    ///
    /// Cancellation aborts a pending handshake with `FeedError::Closed`.
    pub async fn connect(&self) -> Result<FeedSource, FeedError> {
        {
            let mut shared = self.shared.lock().await;
            if shared.closed {
                return Err(FeedError::Closed);
            }
            shared.transition(ConnectionState::Connecting);
        }

        info!(url = %self.config.ws_url, "Connecting to pump.fun feed");
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Shutdown requested during handshake");
                return Err(FeedError::Closed);
            }
            result = connect_async(self.config.ws_url.as_str()) => result,
        };
        self.metrics
            .record(Operation::FeedConnect, started.elapsed(), result.is_ok());

        let (ws_stream, response) =
            result.map_err(|e| FeedError::Connect(e.to_string()))?;
        debug!(status = %response.status(), "WebSocket handshake complete");

        let (sink, source) = ws_stream.split();

        let mut shared = self.shared.lock().await;
        if shared.closed {
            return Err(FeedError::Closed);
        }
        shared.sink = Some(sink);
        Ok(source)
    }

    /// Send the `subscribeNewToken` request on the open transport.
    ///
    /// Any failure drops the transport and is reported as a connect failure.
    pub async fn subscribe(&self) -> Result<(), FeedError> {
        self.shared
            .lock()
            .await
            .transition(ConnectionState::Subscribing);

        let started = Instant::now();
        let result = match SubscribeMessage::new_token().to_json() {
            Ok(payload) => self.send_frame(Message::Text(payload.into())).await,
            Err(e) => Err(FeedError::WebSocket(e.to_string())),
        };
        self.metrics
            .record(Operation::FeedSubscribe, started.elapsed(), result.is_ok());

        if let Err(e) = result {
            self.teardown().await;
            return Err(FeedError::Connect(format!("subscription failed: {}", e)));
        }

        info!("Subscribed to new token events");
        Ok(())
    }

    /// Connect and subscribe in one step
    pub async fn establish(&self) -> Result<FeedSource, FeedError> {
        let source = self.connect().await?;
        self.subscribe().await?;
        Ok(source)
    }

    /// Establish the first connection, then keep streaming in the background.
    ///
    /// Fails if the first connection cannot be established.
    pub async fn start(&self) -> Result<JoinHandle<()>, FeedError> {
        let source = self.establish().await?;
        let manager = self.clone();
        Ok(tokio::spawn(async move {
            manager.supervise(Some(source)).await;
        }))
    }

    /// Connect, stream and reconnect until closed or cancelled
    pub async fn run(&self) {
        self.supervise(None).await;
    }

    async fn supervise(&self, mut pending: Option<FeedSource>) {
        let mut attempt = 0u32;

        loop {
            let source = match pending.take() {
                Some(source) => Some(source),
                None => match self.establish().await {
                    Ok(source) => Some(source),
                    Err(FeedError::Closed) => break,
                    Err(e) => {
                        warn!(error = %e, "Feed connection attempt failed");
                        None
                    }
                },
            };

            if let Some(source) = source {
                attempt = 0;
                self.stream(source).await;
            }

            if self.cancel.is_cancelled() {
                break;
            }

            attempt += 1;
            let delay = self.config.reconnect.delay(attempt);
            {
                let mut shared = self.shared.lock().await;
                if shared.closed {
                    break;
                }
                shared.sink = None;
                shared.transition(ConnectionState::Disconnected);
                shared.reconnect_count += 1;
            }
            self.metrics.counters().record_reconnect();
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Feed disconnected, reconnecting");

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let sink = {
            let mut shared = self.shared.lock().await;
            shared.transition(ConnectionState::Closed);
            shared.sink.take()
        };
        if let Some(sink) = sink {
            send_close_frame(sink).await;
        }
        info!("Feed connection stopped");
    }

    /// Read frames until the connection drops or shutdown is requested
    async fn stream(&self, mut source: FeedSource) {
        self.shared
            .lock()
            .await
            .transition(ConnectionState::Streaming);
        info!("Streaming token creation events");

        loop {
            let next = async {
                match self.config.idle_timeout {
                    Some(limit) => tokio::time::timeout(limit, source.next()).await.ok(),
                    None => Some(source.next().await),
                }
            };
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Shutdown requested, leaving read loop");
                    return;
                }
                frame = next => frame,
            };

            let Some(frame) = frame else {
                warn!(
                    idle_ms = self.config.idle_timeout.map_or(0, |d| d.as_millis() as u64),
                    "No frames from feed, treating connection as stale"
                );
                return;
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    self.handler.handle_payload(text.as_str()).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.send_frame(Message::Pong(data)).await {
                        debug!(error = %e, "Failed to answer ping");
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!(?frame, "Feed closed by server");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if self.cancel.is_cancelled() {
                        debug!(error = %e, "Read interrupted by shutdown");
                    } else {
                        warn!(error = %e, "Feed read error");
                    }
                    return;
                }
                None => {
                    warn!("Feed stream ended");
                    return;
                }
            }
        }
    }

    /// Send one frame. The write half is moved out of the lock for the
    /// duration of the send.
    async fn send_frame(&self, message: Message) -> Result<(), FeedError> {
        let mut sink = self
            .shared
            .lock()
            .await
            .sink
            .take()
            .ok_or(FeedError::NotConnected)?;

        let result = sink.send(message).await;

        let mut shared = self.shared.lock().await;
        if !shared.closed && shared.sink.is_none() {
            shared.sink = Some(sink);
        }
        result.map_err(|e| FeedError::WebSocket(e.to_string()))
    }

    async fn teardown(&self) {
        let mut shared = self.shared.lock().await;
        shared.sink = None;
        shared.transition(ConnectionState::Disconnected);
    }

    /// Close the connection and stop every loop tied to it.
    ///
    /// Sends a normal-closure frame when connected. A second call returns
    /// `FeedError::AlreadyClosed`.
    pub async fn close(&self) -> Result<(), FeedError> {
        let sink = {
            let mut shared = self.shared.lock().await;
            if shared.closed {
                return Err(FeedError::AlreadyClosed);
            }
            shared.closed = true;
            shared.state = ConnectionState::Closed;
            shared.sink.take()
        };

        self.cancel.cancel();

        if let Some(sink) = sink {
            send_close_frame(sink).await;
        }

        info!("Feed connection closed");
        Ok(())
    }
}

/// Best-effort normal closure, bounded by `CLOSE_FRAME_TIMEOUT`
async fn send_close_frame(mut sink: WsSink) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: Utf8Bytes::from_static("shutdown"),
    };
    let sent = tokio::time::timeout(CLOSE_FRAME_TIMEOUT, async {
        sink.send(Message::Close(Some(frame))).await?;
        sink.close().await
    })
    .await;

    match sent {
        Ok(Ok(())) => debug!("Close frame sent"),
        Ok(Err(e)) => debug!(error = %e, "Close frame not delivered"),
        Err(_) => debug!("Timed out sending close frame"),
    }
}
