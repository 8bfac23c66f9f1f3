//! Transport layer: the connector seam and the per-connection task.
//!
//! The manager never touches sockets directly. It spawns one
//! `run_connection` task per live channel; the task connects through a
//! [`Connector`], then forwards everything that happens on the wire into
//! the manager's command channel as generation-tagged transport events.
//! Tests substitute scripted connectors; production uses [`WsConnector`].

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::manager::commands::{ConnEvent, FeedCommand};
use std::sync::Arc;
use tape_core::ChannelId;

// ============================================================================
// Errors
// ============================================================================

/// Transport-level failures, reported to the manager as error text.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection attempt failed before the handshake completed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The handshake did not complete within the configured bound.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The established stream reported an error.
    #[error("stream error: {0}")]
    Stream(String),
}

// ============================================================================
// Connector Seam
// ============================================================================

/// A source of inbound payload frames from one established connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next payload frame.
    ///
    /// Returns `Ok(None)` on clean close. Control frames (pings, pongs)
    /// are handled internally and never surface here.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Initiates a graceful close. Failures are ignored; the connection
    /// is being torn down either way.
    async fn close(&mut self);
}

/// Opens transport connections.
///
/// The single seam between the manager and the network, so tests can run
/// the full manager against scripted connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects to `url` and returns a frame source once the transport
    /// handshake has completed.
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameSource>, TransportError>;
}

// ============================================================================
// WebSocket Connector
// ============================================================================

/// Production connector over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameSource>, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Box::new(WsFrameSource { inner: stream }))
    }
}

struct WsFrameSource {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        while let Some(message) = self.inner.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text.as_bytes().to_vec())),
                Ok(Message::Binary(payload)) => return Ok(Some(payload.to_vec())),
                Ok(Message::Ping(payload)) => {
                    // Keep the upstream keepalive happy; pongs carry the
                    // ping payload back verbatim.
                    self.inner
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| TransportError::Stream(e.to_string()))?;
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!(close_frame = ?frame, "server closed websocket");
                    return Ok(None);
                }
                Err(e) => return Err(TransportError::Stream(e.to_string())),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

// ============================================================================
// Connection Task
// ============================================================================

/// Runs one channel's connection from handshake to teardown.
///
/// Every observation is forwarded to the manager as a
/// [`FeedCommand::Transport`] tagged with `generation`; the manager drops
/// events from superseded generations, so this task never needs to know
/// whether it is still the current connection.
///
/// The task ends when the connection closes or fails, when `cancel` fires,
/// or when the manager is gone (command channel closed).
pub(crate) async fn run_connection(
    connector: Arc<dyn Connector>,
    channel: ChannelId,
    url: String,
    generation: u64,
    connect_timeout: Option<Duration>,
    events: mpsc::Sender<FeedCommand>,
    cancel: CancellationToken,
) {
    debug!(%channel, generation, url = %url, "connection task starting");

    let connect = async {
        match connect_timeout {
            Some(bound) => match tokio::time::timeout(bound, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::ConnectTimeout(bound)),
            },
            None => connector.connect(&url).await,
        }
    };

    let mut source = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(%channel, generation, "connection task cancelled during connect");
            return;
        }
        result = connect => match result {
            Ok(source) => source,
            Err(e) => {
                warn!(%channel, generation, error = %e, "connect failed");
                let _ = events
                    .send(FeedCommand::transport(channel, generation, ConnEvent::Failed(e.to_string())))
                    .await;
                return;
            }
        },
    };

    if events
        .send(FeedCommand::transport(channel, generation, ConnEvent::Opened))
        .await
        .is_err()
    {
        // Manager is gone; nothing left to serve.
        source.close().await;
        return;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%channel, generation, "connection task cancelled");
                source.close().await;
                return;
            }
            frame = source.next_frame() => match frame {
                Ok(Some(payload)) => {
                    if events
                        .send(FeedCommand::transport(channel, generation, ConnEvent::Frame(payload)))
                        .await
                        .is_err()
                    {
                        source.close().await;
                        return;
                    }
                }
                Ok(None) => {
                    debug!(%channel, generation, "transport closed");
                    let _ = events
                        .send(FeedCommand::transport(channel, generation, ConnEvent::Closed))
                        .await;
                    return;
                }
                Err(e) => {
                    warn!(%channel, generation, error = %e, "transport error");
                    let _ = events
                        .send(FeedCommand::transport(channel, generation, ConnEvent::Failed(e.to_string())))
                        .await;
                    return;
                }
            }
        }
    }
}
