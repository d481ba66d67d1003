//! Connection states and wait ids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Created, no connect attempt yet.
    #[default]
    Initialise,
    /// Waiting for an access token before opening the socket.
    AccessTokenWaiting,
    /// Socket open requested.
    SocketOpen,
    /// Socket open, initial authorisation requested.
    AuthFetch,
    /// Authorised and online.
    AuthActive,
    /// Online, refreshed authorisation requested.
    AuthUpdate,
    /// Socket close requested.
    SocketClose,
    /// Waiting before the next connect attempt.
    ReconnectDelay,
    /// Shut down for good.
    Finalised,
}

impl ConnectionState {
    /// Name used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialise => "initialise",
            Self::AccessTokenWaiting => "access_token_waiting",
            Self::SocketOpen => "socket_open",
            Self::AuthFetch => "auth_fetch",
            Self::AuthActive => "auth_active",
            Self::AuthUpdate => "auth_update",
            Self::SocketClose => "socket_close",
            Self::ReconnectDelay => "reconnect_delay",
            Self::Finalised => "finalised",
        }
    }

    /// Whether the engine can start a connect attempt from this state.
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Initialise | Self::ReconnectDelay)
    }

    /// Whether the socket is (or is being) open in this state.
    #[must_use]
    pub const fn has_socket(self) -> bool {
        matches!(
            self,
            Self::SocketOpen | Self::AuthFetch | Self::AuthActive | Self::AuthUpdate
        )
    }

    /// Whether an action in this state is guarded by a timeout.
    #[must_use]
    pub const fn is_timed(self) -> bool {
        matches!(
            self,
            Self::SocketOpen | Self::AuthFetch | Self::AuthUpdate | Self::SocketClose
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token minted on every state transition.
///
/// Timers and asynchronous completions carry the wait id current when they
/// were started; anything carrying an older id is stale and ignored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WaitId(u64);

impl WaitId {
    /// Raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    pub(super) const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for WaitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
