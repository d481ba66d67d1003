//! Actions requested by the engine and their timeouts.

use std::fmt;
use std::time::Duration;

use super::reason::ReconnectReason;
use super::state::{ConnectionState, WaitId};

/// Bearer token used to authorise the feed connection.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Work the host must carry out on behalf of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a socket to the endpoint.
    OpenSocket {
        /// Selected endpoint.
        endpoint: String,
    },
    /// Authorise the freshly opened socket.
    FetchAuth {
        /// Token to present.
        token: AccessToken,
    },
    /// Refresh authorisation of the open socket.
    UpdateAuth {
        /// Token to present.
        token: AccessToken,
    },
    /// Close the socket.
    CloseSocket,
    /// Wait before reconnecting. The host chooses the delay.
    ReconnectDelay {
        /// Reason for the reconnect.
        reason: ReconnectReason,
    },
}

impl ConnectionAction {
    /// Action name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenSocket { .. } => "open_socket",
            Self::FetchAuth { .. } => "fetch_auth",
            Self::UpdateAuth { .. } => "update_auth",
            Self::CloseSocket => "close_socket",
            Self::ReconnectDelay { .. } => "reconnect_delay",
        }
    }
}

/// An action tagged with the wait id it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    /// What to do.
    pub action: ConnectionAction,
    /// Wait id of the state that requested it.
    pub wait_id: WaitId,
    /// Timeout to arm, if any.
    pub timeout: Option<Duration>,
}

/// Action timeouts and the short-lived socket threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimeouts {
    /// Socket open.
    pub open_socket: Duration,
    /// Initial authorisation.
    pub fetch_auth: Duration,
    /// Authorisation refresh.
    pub update_auth: Duration,
    /// Socket close.
    pub close_socket: Duration,
    /// Sockets closing sooner than this after opening count as short-lived.
    pub short_lived_socket: Duration,
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            open_socket: Duration::from_secs(40),
            fetch_auth: Duration::from_secs(40),
            update_auth: Duration::from_secs(40),
            close_socket: Duration::from_secs(5),
            short_lived_socket: Duration::from_secs(20),
        }
    }
}

impl EngineTimeouts {
    /// Timeout guarding the action issued in `state`.
    #[must_use]
    pub const fn for_state(&self, state: ConnectionState) -> Option<Duration> {
        match state {
            ConnectionState::SocketOpen => Some(self.open_socket),
            ConnectionState::AuthFetch => Some(self.fetch_auth),
            ConnectionState::AuthUpdate => Some(self.update_auth),
            ConnectionState::SocketClose => Some(self.close_socket),
            ConnectionState::Initialise
            | ConnectionState::AccessTokenWaiting
            | ConnectionState::AuthActive
            | ConnectionState::ReconnectDelay
            | ConnectionState::Finalised => None,
        }
    }
}
