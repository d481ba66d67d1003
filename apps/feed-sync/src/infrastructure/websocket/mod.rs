//! WebSocket Transport
//!
//! [`FeedTransport`] over `tokio-tungstenite` with rustls. One socket is
//! open at a time. A reader task forwards text frames and reports the end
//! of the socket as `Closed` or `Error`.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::application::ports::{FeedTransport, SocketEvent, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Close code reported when the socket ended without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// WebSocket feed transport.
#[derive(Clone, Default)]
pub struct WebSocketTransport {
    writer: Arc<Mutex<Option<WsWriter>>>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport").finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Create a transport, installing the ring crypto provider for rustls
    /// unless one is already installed.
    #[must_use]
    pub fn new() -> Self {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::trace!("rustls crypto provider already installed");
        }
        Self::default()
    }
}

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn open(
        &self,
        endpoint: &str,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<(), TransportError> {
        tracing::info!(endpoint, "Opening feed socket");
        let (stream, _response) =
            connect_async(endpoint)
                .await
                .map_err(|e| TransportError::Connect {
                    message: e.to_string(),
                })?;

        let (write, read) = stream.split();
        *self.writer.lock().await = Some(write);
        tokio::spawn(read_socket(read, events));
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let Some(write) = writer.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        write
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Send {
                message: e.to_string(),
            })
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(mut write) = self.writer.lock().await.take() else {
            return Err(TransportError::NotConnected);
        };
        write.close().await.map_err(|e| TransportError::Close {
            message: e.to_string(),
        })
    }
}

async fn read_socket(
    mut read: futures_util::stream::SplitStream<WsStream>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let mut close_frame: Option<(u16, String)> = None;

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if events.send(SocketEvent::Frame(text.to_string())).is_err() {
                    return;
                }
            }
            Ok(Message::Close(frame)) => {
                close_frame = Some(frame.map_or_else(
                    || (1005, String::new()),
                    |f| (u16::from(f.code), f.reason.to_string()),
                ));
            }
            Ok(Message::Binary(data)) => {
                tracing::debug!(len = data.len(), "Ignoring binary feed frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Feed socket read failed");
                let _ = events.send(SocketEvent::Error(e.to_string()));
                return;
            }
        }
    }

    let clean = close_frame.is_some();
    let (code, reason) = close_frame.unwrap_or((ABNORMAL_CLOSURE, String::new()));
    tracing::debug!(code, reason, clean, "Feed socket ended");
    let _ = events.send(SocketEvent::Closed {
        code,
        reason,
        clean,
    });
}
