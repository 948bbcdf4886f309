//! Transport - WebSocket connection to the coordinator
//!
//! The session only sees envelopes: connection lifecycle events
//! (open/close/error) and opaque binary payloads. Reads give up after the
//! configured timeout and report "no data" so callers can re-check their
//! running flag.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default read/write timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport-level wrapper around what the coordinator sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Connection established
    Open,
    /// Application payload
    Data(Bytes),
    /// Peer closed the connection
    Close,
    /// Protocol failure on the connection
    Error,
}

/// Persistent message transport to the coordinator
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Url) -> Result<(), TransportError>;

    fn set_timeout(&self, timeout: Duration) -> Result<(), TransportError>;

    /// Next envelope, or `None` when the timeout elapsed without one
    async fn read(&self) -> Result<Option<Envelope>, TransportError>;

    async fn write(&self, payload: Bytes) -> Result<(), TransportError>;

    async fn disconnect(&self);
}

/// Transport over tokio-tungstenite
pub struct WebSocketTransport {
    /// Write half; shared by both loops
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    /// Read half; only the inbound loop reads
    reader: Mutex<Option<SplitStream<WsStream>>>,
    timeout: StdMutex<Duration>,
    /// Set by connect, consumed by the first read
    pending_open: AtomicBool,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            timeout: StdMutex::new(DEFAULT_TIMEOUT),
            pending_open: AtomicBool::new(false),
        }
    }

    fn timeout(&self) -> Duration {
        *self.timeout.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &Url) -> Result<(), TransportError> {
        info!("Connecting to coordinator at {}", endpoint);

        let (ws_stream, response) = connect_async(endpoint.as_str()).await?;
        info!("WebSocket connected (status: {})", response.status());

        let (write, read) = ws_stream.split();
        *self.writer.lock().await = Some(write);
        *self.reader.lock().await = Some(read);
        self.pending_open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_timeout(&self, timeout: Duration) -> Result<(), TransportError> {
        *self.timeout.lock().unwrap_or_else(|e| e.into_inner()) = timeout;
        Ok(())
    }

    async fn read(&self) -> Result<Option<Envelope>, TransportError> {
        if self.pending_open.swap(false, Ordering::SeqCst) {
            return Ok(Some(Envelope::Open));
        }

        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;

        let next = match tokio::time::timeout(self.timeout(), reader.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(None),
        };

        match next {
            None => Ok(Some(Envelope::Close)),
            Some(Ok(Message::Binary(data))) => Ok(Some(Envelope::Data(Bytes::from(data)))),
            Some(Ok(Message::Close(frame))) => {
                debug!("Close frame received: {:?}", frame);
                Ok(Some(Envelope::Close))
            }
            Some(Ok(Message::Text(text))) => {
                warn!("Ignoring text frame ({} bytes)", text.len());
                Ok(None)
            }
            // Ping replies are queued by tungstenite itself
            Some(Ok(_)) => Ok(None),
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                Ok(Some(Envelope::Close))
            }
            Some(Err(WsError::Io(e))) => Err(TransportError::WebSocket(WsError::Io(e))),
            Some(Err(e)) => {
                warn!("WebSocket protocol error: {}", e);
                Ok(Some(Envelope::Error))
            }
        }
    }

    async fn write(&self, payload: Bytes) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;

        match tokio::time::timeout(self.timeout(), writer.send(Message::Binary(payload.to_vec())))
            .await
        {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn disconnect(&self) {
        self.pending_open.store(false, Ordering::SeqCst);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let timeout = self.timeout();
            match tokio::time::timeout(timeout, writer.close()).await {
                Ok(Ok(())) => debug!("WebSocket closed"),
                Ok(Err(e)) => debug!("WebSocket close error: {}", e),
                Err(_) => debug!("WebSocket close timed out"),
            }
        }
        self.reader.lock().await.take();
        info!("Disconnected from coordinator");
    }
}
