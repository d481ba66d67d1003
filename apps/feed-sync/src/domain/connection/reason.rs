//! Reconnect reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why the engine dropped the current connection attempt and reconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconnectReason {
    /// Endpoint list replaced while connected or connecting.
    NewEndpoints,
    /// Socket failed to open.
    SocketConnectingError,
    /// Server rejected the access token on initial authorisation.
    AuthRejected,
    /// Server rejected the access token on refresh.
    AuthRefreshRejected,
    /// Refresh failed for a reason other than rejection.
    AuthRefreshFailed,
    /// Server or network closed the socket.
    UnexpectedSocketClose,
    /// Socket reported an error after it was open.
    SocketClosedError,
    /// An action did not complete within its timeout.
    Timeout,
    /// Socket opened but no access token was available to authorise it.
    AccessTokenUnavailable,
}

impl ReconnectReason {
    /// Name used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewEndpoints => "new_endpoints",
            Self::SocketConnectingError => "socket_connecting_error",
            Self::AuthRejected => "auth_rejected",
            Self::AuthRefreshRejected => "auth_refresh_rejected",
            Self::AuthRefreshFailed => "auth_refresh_failed",
            Self::UnexpectedSocketClose => "unexpected_socket_close",
            Self::SocketClosedError => "socket_closed_error",
            Self::Timeout => "timeout",
            Self::AccessTokenUnavailable => "access_token_unavailable",
        }
    }
}

impl fmt::Display for ReconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
