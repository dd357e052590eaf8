//! Persistent outbound channel to the peer service.
//!
//! A [`Link`] knows how to reach the peer; each call to [`Link::open`]
//! performs one handshake and yields a [`Session`] that frames are written
//! to until it fails or the peer goes away. The delivery loops own
//! reconnection.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Connection closed by peer")]
    Closed,
}

/// Something that can establish a session with the peer.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    type Session: Session;

    async fn open(&self) -> Result<Self::Session, LinkError>;

    /// Peer address, for logs.
    fn describe(&self) -> String;
}

/// An established connection frames can be written to.
#[async_trait]
pub trait Session: Send + 'static {
    /// Send one text frame. Returns once the frame is flushed.
    async fn send_text(&mut self, text: String) -> Result<(), LinkError>;

    /// Resolves once the peer has closed the session or the connection has
    /// failed. Inbound frames are read and discarded. Cancel-safe.
    async fn closed(&mut self);

    /// Close the session politely. Errors are ignored.
    async fn close(&mut self) {}
}

/// WebSocket client link.
pub struct WsLink {
    url: String,
}

impl WsLink {
    /// * `url` - WebSocket endpoint, e.g. `ws://127.0.0.1:8888/ws/tasks`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsSession {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl Link for WsLink {
    type Session = WsSession;

    async fn open(&self) -> Result<WsSession, LinkError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| LinkError::Connect(format!("{}: {e}", self.url)))?;

        tracing::info!(url = %self.url, "WebSocket link established");
        let (sink, stream) = stream.split();
        Ok(WsSession { sink, stream })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[async_trait]
impl Session for WsSession {
    async fn send_text(&mut self, text: String) -> Result<(), LinkError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| match e {
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                | tokio_tungstenite::tungstenite::Error::AlreadyClosed => LinkError::Closed,
                other => LinkError::Send(other.to_string()),
            })
    }

    async fn closed(&mut self) {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Peer closed WebSocket");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::info!(error = %e, "WebSocket receive error");
                    return;
                }
                None => return,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the second attempt; the first is immediate.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Growth factor applied after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Next delay after `current`, clamped to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }
}
