use crate::core::config::PlatformConfig;
use crate::core::errors::PlatformError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, instrument, warn};

/// Connection lifecycle of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    Connecting,
    Established,
    Closed,
    Error,
}

/// Shared pending-write queue.
///
/// `push` never blocks and performs no I/O, so a handle may be cloned into a
/// reply callback and used from inside the service loop; queued frames are
/// written out when the link next signals it is writable.
#[derive(Debug, Clone, Default)]
pub struct Outbound {
    queue: Arc<Mutex<VecDeque<String>>>,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: String) {
        self.lock().push_back(frame);
    }

    pub fn pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Transport capability the platform drives.
///
/// Implementations own the socket; the platform owns the pacing: `connect`
/// and `flush` and `next_frame` are only ever called from inside the
/// cooperative service loop, one at a time.
#[async_trait]
pub trait WireTransport: Send {
    /// Bring the link up. Idempotent once established.
    async fn connect(&mut self) -> Result<(), PlatformError>;

    /// Close the link and drop any queued writes.
    async fn disconnect(&mut self) -> Result<(), PlatformError>;

    /// Write out every queued frame.
    async fn flush(&mut self) -> Result<(), PlatformError>;

    /// Next inbound text frame, or `None` when the slice elapses or the
    /// peer goes away (check `state` to tell the two apart).
    async fn next_frame(&mut self, timeout: Duration) -> Result<Option<String>, PlatformError>;

    /// Enqueue one outbound frame. Never blocks, performs no I/O.
    fn send(&self, frame: String);

    /// A cloneable handle to the pending-write queue.
    fn outbound(&self) -> Outbound;

    fn state(&self) -> LinkState;

    fn is_established(&self) -> bool {
        self.state() == LinkState::Established
    }
}

type WsSink = futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Tungstenite-backed link with bounded connect retry and deferred writes.
pub struct TungsteniteLink {
    url: String,
    connection_attempts: u32,
    reconnect_delay: Duration,
    state: LinkState,
    write: Option<WsSink>,
    read: Option<WsStream>,
    outbound: Outbound,
}

impl TungsteniteLink {
    pub fn new(config: &PlatformConfig, outbound: Outbound) -> Self {
        Self {
            url: config.ws_url(),
            connection_attempts: config.connection_attempts,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            state: LinkState::Uninitialized,
            write: None,
            read: None,
            outbound,
        }
    }

    fn drop_streams(&mut self, state: LinkState) {
        self.write = None;
        self.read = None;
        self.state = state;
    }
}

#[async_trait]
impl WireTransport for TungsteniteLink {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&mut self) -> Result<(), PlatformError> {
        if self.state == LinkState::Established {
            debug!("already connected");
            return Ok(());
        }

        for attempt in 1..=self.connection_attempts {
            self.state = LinkState::Connecting;
            debug!(attempt, "connecting");
            match connect_async(&self.url).await {
                Ok((stream, _)) => {
                    let (write, read) = stream.split();
                    self.write = Some(write);
                    self.read = Some(read);
                    self.state = LinkState::Established;
                    debug!(attempt, "established");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "connection attempt failed");
                    if attempt < self.connection_attempts {
                        sleep(self.reconnect_delay).await;
                    }
                }
            }
        }

        self.state = LinkState::Error;
        Err(PlatformError::ConnectionFailed {
            attempts: self.connection_attempts,
        })
    }

    async fn disconnect(&mut self) -> Result<(), PlatformError> {
        if let Some(write) = self.write.as_mut() {
            debug!("closing connection");
            let _ = write.send(Message::Close(None)).await;
        }
        self.outbound.clear();
        self.drop_streams(LinkState::Closed);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PlatformError> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        let Some(write) = self.write.as_mut() else {
            return Err(PlatformError::NetworkError("link not established".into()));
        };
        while let Some(frame) = self.outbound.pop() {
            debug!(len = frame.len(), "writing frame");
            if let Err(e) = write.send(Message::Text(frame)).await {
                self.drop_streams(LinkState::Error);
                return Err(PlatformError::NetworkError(format!("write failed: {e}")));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, timeout))]
    async fn next_frame(&mut self, timeout: Duration) -> Result<Option<String>, PlatformError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let Some(read) = self.read.as_mut() else {
                return Ok(None);
            };
            let msg = match tokio::time::timeout_at(deadline, read.next()).await {
                Err(_) => return Ok(None), // slice elapsed
                Ok(None) => {
                    debug!("stream closed by peer");
                    self.drop_streams(LinkState::Closed);
                    return Ok(None);
                }
                Ok(Some(Err(e))) => {
                    self.drop_streams(LinkState::Error);
                    return Err(PlatformError::NetworkError(format!("read failed: {e}")));
                }
                Ok(Some(Ok(msg))) => msg,
            };

            match msg {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => return Ok(Some(text)),
                    Err(e) => debug!(error = %e, "non-UTF-8 frame dropped"),
                },
                Message::Ping(payload) => {
                    // answered at transport level
                    if let Some(write) = self.write.as_mut() {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            warn!(error = %e, "pong failed");
                        }
                    }
                }
                Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(_) => {
                    debug!("close frame received");
                    self.drop_streams(LinkState::Closed);
                    return Ok(None);
                }
            }
        }
    }

    fn send(&self, frame: String) {
        self.outbound.push(frame);
    }

    fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    fn state(&self) -> LinkState {
        self.state
    }
}
