//! Connection diagnostics: counters, the diagnostics sink and the clock.

use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use super::reason::ReconnectReason;
use super::state::ConnectionState;
use crate::domain::aurc::DataAnomaly;

/// Snapshot of the connection's diagnostic counters.
///
/// Successive counters reset when their category next succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionDiagnostics {
    /// Consecutive failed socket opens.
    pub socket_connecting_successive_error_count: u32,
    /// Consecutive failed socket closes.
    pub socket_closing_successive_error_count: u32,
    /// Consecutive sockets that closed shortly after opening.
    pub short_lived_closed_socket_successive_count: u32,
    /// Consecutive failed initial authorisations.
    pub auth_fetch_successive_failure_count: u32,
    /// Consecutive failed authorisation refreshes.
    pub auth_refresh_successive_failure_count: u32,
    /// Sockets closed without being asked to.
    pub unexpected_socket_close_count: u64,
    /// Action timeouts.
    pub timeout_count: u64,
    /// State that last timed out.
    pub last_timed_out_state: Option<ConnectionState>,
    /// Reconnects started.
    pub reconnect_count: u64,
    /// Reason of the last reconnect.
    pub last_reconnect_reason: Option<ReconnectReason>,
    /// Correlation id of the current connect attempt.
    pub connection_attempt_id: Option<Uuid>,
}

/// Receiver of connection and data diagnostics.
///
/// Passed to engines at construction. Every method defaults to doing nothing.
pub trait DiagnosticsSink: Send + Sync {
    /// The connection changed state.
    fn state_changed(&self, _from: ConnectionState, _to: ConnectionState) {}

    /// A reconnect started.
    fn reconnecting(&self, _reason: ReconnectReason) {}

    /// An action timed out in `state`.
    fn timed_out(&self, _state: ConnectionState) {}

    /// The socket closed without being asked to.
    fn unexpected_socket_close(&self, _short_lived: bool) {}

    /// The connection came online or went offline.
    fn online_changed(&self, _online: bool) {}

    /// A change batch contained an anomaly.
    fn data_anomaly(&self, _anomaly: &DataAnomaly) {}
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
