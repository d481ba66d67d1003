//! Auth Port (Driven Port)
//!
//! Authorises the open feed socket with an access token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::connection::AccessToken;

/// Authorisation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// The server rejected the token. A new token may succeed.
    #[error("Access token rejected: {message}")]
    Rejected {
        /// Server message.
        message: String,
    },

    /// Authorisation failed for another reason.
    #[error("Authorisation failed: {message}")]
    Failed {
        /// Error details.
        message: String,
    },
}

impl AuthFailure {
    /// Whether the token itself was rejected.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Port for feed authorisation.
#[async_trait]
pub trait AuthPort: Send + Sync {
    /// Authorise a freshly opened socket. Returns the authorisation expiry.
    async fn fetch_auth(&self, token: &AccessToken) -> Result<DateTime<Utc>, AuthFailure>;

    /// Refresh authorisation of the open socket. Returns the new expiry.
    async fn update_auth(&self, token: &AccessToken) -> Result<DateTime<Utc>, AuthFailure>;
}
