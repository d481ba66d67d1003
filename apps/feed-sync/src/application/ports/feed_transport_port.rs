//! Feed Transport Port (Driven Port)
//!
//! Interface for the feed socket. One socket is open at a time; its
//! inbound traffic and termination are reported as [`SocketEvent`]s on the
//! channel handed to [`FeedTransport::open`].

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("Feed socket connect failed: {message}")]
    Connect {
        /// Error details.
        message: String,
    },

    /// A frame could not be sent.
    #[error("Feed socket send failed: {message}")]
    Send {
        /// Error details.
        message: String,
    },

    /// The socket could not be closed cleanly.
    #[error("Feed socket close failed: {message}")]
    Close {
        /// Error details.
        message: String,
    },

    /// No socket is open.
    #[error("Feed socket not connected")]
    NotConnected,
}

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Inbound text frame.
    Frame(String),
    /// The socket closed.
    Closed {
        /// Close code (1005 when none was received).
        code: u16,
        /// Close reason.
        reason: String,
        /// Whether the closing handshake completed.
        clean: bool,
    },
    /// The socket failed and is gone.
    Error(String),
}

/// Port for the feed socket.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Open a socket to `endpoint`. Events for the socket are sent on
    /// `events` until it terminates with `Closed` or `Error`.
    async fn open(
        &self,
        endpoint: &str,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<(), TransportError>;

    /// Send a text frame on the open socket.
    async fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Start closing the open socket. Completion is reported as
    /// [`SocketEvent::Closed`].
    async fn close(&self) -> Result<(), TransportError>;
}
