//! Connection State Engine
//!
//! Synchronous state machine governing one feed connection: socket
//! lifecycle, access-token acquisition and refresh, reconnection and
//! timeout detection. The engine performs no I/O. Each call runs to
//! completion and queues [`EngineOutput`]s that the host drains with
//! [`ConnectionStateEngine::take_outputs`] and carries out.
//!
//! # States
//!
//! ```text
//! Initialise ─┬─► AccessTokenWaiting ─► SocketOpen ─► AuthFetch ─► AuthActive ◄─► AuthUpdate
//!             └──────────────────────────►┘                             │
//!                                                                       ▼
//! ReconnectDelay ◄──────────────────────────────────────────────── SocketClose ─► Finalised
//! ```
//!
//! Every transition mints a new [`WaitId`]. Action requests carry the wait
//! id of the state that issued them and timers report back through
//! [`ConnectionStateEngine::advise_timeout`]; a timer whose id is no longer
//! current is ignored. There is no other cancellation mechanism.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use super::action::{AccessToken, ActionRequest, ConnectionAction, EngineTimeouts};
use super::diagnostics::{Clock, ConnectionDiagnostics, DiagnosticsSink};
use super::reason::ReconnectReason;
use super::state::{ConnectionState, WaitId};

// =============================================================================
// Outputs
// =============================================================================

/// Something the host must act on or may observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    /// Carry out an action and arm its timeout.
    Action(ActionRequest),
    /// State changed.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
        /// Wait id minted for the new state.
        wait_id: WaitId,
    },
    /// Authorised and online.
    CameOnline,
    /// No longer online.
    WentOffline,
    /// Reconnect started.
    Reconnecting(ReconnectReason),
    /// A (new) access token is needed.
    AccessTokenRequested,
    /// Shut down for good.
    Finalised,
}

// =============================================================================
// Engine
// =============================================================================

/// State machine for one feed connection.
pub struct ConnectionStateEngine {
    timeouts: EngineTimeouts,
    state: ConnectionState,
    wait_id: WaitId,
    endpoints: Vec<String>,
    active_endpoint: Option<String>,
    access_token: Option<AccessToken>,
    token_requested: bool,
    token_update_pending: bool,
    finalising: bool,
    online: bool,
    auth_expiry: Option<DateTime<Utc>>,
    socket_opened_at: Option<Instant>,
    pending_reason: Option<ReconnectReason>,
    counters: ConnectionDiagnostics,
    outputs: VecDeque<EngineOutput>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ConnectionStateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionStateEngine")
            .field("state", &self.state)
            .field("wait_id", &self.wait_id)
            .field("endpoints", &self.endpoints)
            .field("online", &self.online)
            .field("finalising", &self.finalising)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl ConnectionStateEngine {
    /// Create an engine in `Initialise`.
    #[must_use]
    pub fn new(
        timeouts: EngineTimeouts,
        diagnostics: Arc<dyn DiagnosticsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            timeouts,
            state: ConnectionState::Initialise,
            wait_id: WaitId::default(),
            endpoints: Vec::new(),
            active_endpoint: None,
            access_token: None,
            token_requested: false,
            token_update_pending: false,
            finalising: false,
            online: false,
            auth_expiry: None,
            socket_opened_at: None,
            pending_reason: None,
            counters: ConnectionDiagnostics::default(),
            outputs: VecDeque::new(),
            diagnostics,
            clock,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current wait id.
    #[must_use]
    pub const fn wait_id(&self) -> WaitId {
        self.wait_id
    }

    /// Whether `wait_id` is current. Hosts use this to drop late completions.
    #[must_use]
    pub fn is_current_wait_id(&self, wait_id: WaitId) -> bool {
        self.wait_id == wait_id
    }

    /// Whether the connection is authorised and online.
    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.online
    }

    /// Whether `finalise` has been called.
    #[must_use]
    pub const fn is_finalising(&self) -> bool {
        self.finalising
    }

    /// Endpoint of the current connect attempt.
    #[must_use]
    pub fn active_endpoint(&self) -> Option<&str> {
        self.active_endpoint.as_deref()
    }

    /// Expiry of the current authorisation.
    #[must_use]
    pub const fn auth_expiry(&self) -> Option<DateTime<Utc>> {
        self.auth_expiry
    }

    /// Snapshot of the diagnostic counters.
    #[must_use]
    pub fn diagnostics(&self) -> ConnectionDiagnostics {
        self.counters.clone()
    }

    /// Drain queued outputs in the order they were produced.
    pub fn take_outputs(&mut self) -> Vec<EngineOutput> {
        self.outputs.drain(..).collect()
    }

    // -------------------------------------------------------------------------
    // Inputs from the host
    // -------------------------------------------------------------------------

    /// Replace the candidate endpoints.
    ///
    /// Connects immediately when idle, otherwise reconnects.
    pub fn update_endpoints(&mut self, endpoints: Vec<String>) {
        if self.finalising {
            tracing::debug!(state = %self.state, "Ignoring endpoints while finalising");
            return;
        }

        tracing::info!(count = endpoints.len(), state = %self.state, "Feed endpoints updated");
        self.endpoints = endpoints;

        if self.state.is_idle() {
            self.connect();
        } else {
            self.reconnect(ReconnectReason::NewEndpoints);
        }
    }

    /// Pick the endpoint for a connect attempt: the only candidate, or one
    /// chosen uniformly at random.
    #[must_use]
    pub fn select_endpoint(&self) -> Option<String> {
        match self.endpoints.as_slice() {
            [] => None,
            [only] => Some(only.clone()),
            many => {
                let index = rand::rng().random_range(0..many.len());
                Some(many[index].clone())
            }
        }
    }

    /// Record a new access token.
    pub fn update_access_token(&mut self, token: AccessToken) {
        if self.finalising {
            tracing::debug!(state = %self.state, "Ignoring access token while finalising");
            return;
        }

        self.access_token = Some(token.clone());
        self.token_requested = false;

        match self.state {
            ConnectionState::AccessTokenWaiting => {
                match self.active_endpoint.clone().or_else(|| self.select_endpoint()) {
                    Some(endpoint) => self.open_socket(endpoint),
                    None => tracing::warn!("Access token arrived but no endpoint is available"),
                }
            }
            ConnectionState::AuthActive => self.update_auth(token),
            ConnectionState::AuthFetch | ConnectionState::AuthUpdate => {
                self.token_update_pending = true;
            }
            ConnectionState::Initialise
            | ConnectionState::SocketOpen
            | ConnectionState::SocketClose
            | ConnectionState::ReconnectDelay
            | ConnectionState::Finalised => {}
        }
    }

    /// The socket opened.
    pub fn advise_socket_open_success(&mut self) -> bool {
        if !self.expect_state(ConnectionState::SocketOpen, "socket_open_success") {
            return false;
        }

        self.counters.socket_connecting_successive_error_count = 0;
        self.socket_opened_at = Some(self.clock.now());

        match self.access_token.clone() {
            Some(token) => {
                self.token_update_pending = false;
                self.transition(ConnectionState::AuthFetch);
                self.request(ConnectionAction::FetchAuth { token });
            }
            None => self.reconnect(ReconnectReason::AccessTokenUnavailable),
        }
        true
    }

    /// The socket failed to open.
    pub fn advise_socket_connecting_error(&mut self, error: &str) -> bool {
        if !self.expect_state(ConnectionState::SocketOpen, "socket_connecting_error") {
            return false;
        }

        self.counters.socket_connecting_successive_error_count += 1;
        tracing::warn!(
            error,
            successive = self.counters.socket_connecting_successive_error_count,
            "Feed socket failed to open"
        );
        self.reconnect_socket_closed(ReconnectReason::SocketConnectingError);
        true
    }

    /// Initial authorisation succeeded.
    pub fn advise_auth_fetch_success(&mut self, expiry: DateTime<Utc>) -> bool {
        if !self.expect_state(ConnectionState::AuthFetch, "auth_fetch_success") {
            return false;
        }

        self.counters.auth_fetch_successive_failure_count = 0;
        self.auth_expiry = Some(expiry);
        self.transition(ConnectionState::AuthActive);
        self.go_online();
        self.apply_pending_token_update();
        true
    }

    /// Initial authorisation failed.
    ///
    /// A rejected token is discarded and the engine reconnects once a new
    /// token arrives. Any other failure is unrecoverable and finalises.
    pub fn advise_auth_fetch_failure(&mut self, rejected: bool) -> bool {
        if !self.expect_state(ConnectionState::AuthFetch, "auth_fetch_failure") {
            return false;
        }

        self.counters.auth_fetch_successive_failure_count += 1;
        if rejected {
            tracing::warn!(
                successive = self.counters.auth_fetch_successive_failure_count,
                "Feed rejected access token"
            );
            self.discard_rejected_token();
            self.reconnect(ReconnectReason::AuthRejected);
        } else {
            tracing::error!("Feed authorisation failed, finalising connection");
            self.finalise(false);
        }
        true
    }

    /// Authorisation refresh succeeded.
    pub fn advise_auth_update_success(&mut self, expiry: DateTime<Utc>) -> bool {
        if !self.expect_state(ConnectionState::AuthUpdate, "auth_update_success") {
            return false;
        }

        self.counters.auth_refresh_successive_failure_count = 0;
        self.auth_expiry = Some(expiry);
        self.transition(ConnectionState::AuthActive);
        self.apply_pending_token_update();
        true
    }

    /// Authorisation refresh failed.
    pub fn advise_auth_update_failure(&mut self, rejected: bool) -> bool {
        if !self.expect_state(ConnectionState::AuthUpdate, "auth_update_failure") {
            return false;
        }

        self.counters.auth_refresh_successive_failure_count += 1;
        tracing::warn!(
            rejected,
            successive = self.counters.auth_refresh_successive_failure_count,
            "Feed authorisation refresh failed"
        );
        if rejected {
            self.discard_rejected_token();
            self.reconnect(ReconnectReason::AuthRefreshRejected);
        } else {
            self.reconnect(ReconnectReason::AuthRefreshFailed);
        }
        true
    }

    /// The socket closed.
    ///
    /// Completes an expected close; otherwise counts an unexpected close
    /// and reconnects.
    pub fn advise_socket_close(&mut self, code: u16, reason: &str, clean: bool) -> bool {
        match self.state {
            ConnectionState::SocketClose => {
                tracing::debug!(code, reason, clean, "Feed socket closed");
                self.counters.socket_closing_successive_error_count = 0;
                self.complete_close();
                true
            }
            state if state.has_socket() => {
                self.count_unexpected_close(code, reason, clean);
                self.reconnect_socket_closed(ReconnectReason::UnexpectedSocketClose);
                true
            }
            _ => {
                self.expect_state(ConnectionState::SocketClose, "socket_close");
                false
            }
        }
    }

    /// Closing the socket failed. The socket is treated as closed.
    pub fn advise_socket_closing_error(&mut self, error: &str) -> bool {
        if !self.expect_state(ConnectionState::SocketClose, "socket_closing_error") {
            return false;
        }

        self.counters.socket_closing_successive_error_count += 1;
        tracing::warn!(
            error,
            successive = self.counters.socket_closing_successive_error_count,
            "Feed socket close failed"
        );
        self.complete_close();
        true
    }

    /// The open socket reported an error and is gone.
    pub fn advise_socket_closed_error(&mut self, error: &str) -> bool {
        match self.state {
            ConnectionState::SocketClose => {
                tracing::debug!(error, "Feed socket errored while closing");
                self.complete_close();
                true
            }
            state if state.has_socket() => {
                tracing::warn!(error, state = %state, "Feed socket error");
                self.reconnect_socket_closed(ReconnectReason::SocketClosedError);
                true
            }
            _ => {
                self.expect_state(ConnectionState::SocketClose, "socket_closed_error");
                false
            }
        }
    }

    /// The reconnect delay elapsed.
    pub fn advise_reconnect_delay_completed(&mut self) -> bool {
        if !self.expect_state(ConnectionState::ReconnectDelay, "reconnect_delay_completed") {
            return false;
        }
        self.connect();
        true
    }

    /// A timer armed for `wait_id` fired.
    ///
    /// Returns `false` (and does nothing) when the wait id is stale.
    pub fn advise_timeout(&mut self, wait_id: WaitId) -> bool {
        if wait_id != self.wait_id || !self.state.is_timed() {
            tracing::trace!(
                wait_id = %wait_id,
                current = %self.wait_id,
                "Ignoring stale timeout"
            );
            return false;
        }

        let state = self.state;
        self.counters.timeout_count += 1;
        self.counters.last_timed_out_state = Some(state);
        self.diagnostics.timed_out(state);
        tracing::warn!(state = %state, wait_id = %wait_id, "Feed connection action timed out");

        if state == ConnectionState::SocketClose {
            self.complete_close();
        } else {
            self.reconnect(ReconnectReason::Timeout);
        }
        true
    }

    /// Shut the connection down for good.
    ///
    /// `socket_was_closed` tells the engine the socket is already gone, so no
    /// close is requested.
    pub fn finalise(&mut self, socket_was_closed: bool) {
        if self.state == ConnectionState::Finalised {
            return;
        }

        tracing::info!(state = %self.state, socket_was_closed, "Finalising feed connection");
        self.finalising = true;
        self.pending_reason = None;

        if socket_was_closed {
            self.socket_gone();
        } else {
            self.disconnect();
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn connect(&mut self) {
        let Some(endpoint) = self.select_endpoint() else {
            tracing::warn!(state = %self.state, "No feed endpoints, staying idle");
            return;
        };

        let attempt_id = Uuid::new_v4();
        self.counters.connection_attempt_id = Some(attempt_id);
        tracing::info!(endpoint = %endpoint, attempt_id = %attempt_id, "Connecting to feed");
        self.active_endpoint = Some(endpoint.clone());

        if self.access_token.is_some() {
            self.open_socket(endpoint);
        } else {
            self.transition(ConnectionState::AccessTokenWaiting);
            self.request_token();
        }
    }

    fn open_socket(&mut self, endpoint: String) {
        self.transition(ConnectionState::SocketOpen);
        self.request(ConnectionAction::OpenSocket { endpoint });
    }

    fn update_auth(&mut self, token: AccessToken) {
        self.token_update_pending = false;
        self.transition(ConnectionState::AuthUpdate);
        self.request(ConnectionAction::UpdateAuth { token });
    }

    fn apply_pending_token_update(&mut self) {
        if !self.token_update_pending {
            return;
        }
        if let Some(token) = self.access_token.clone() {
            self.update_auth(token);
        }
    }

    fn discard_rejected_token(&mut self) {
        // A token that arrived after the rejected one was sent is still untried.
        if self.token_update_pending {
            self.token_update_pending = false;
            return;
        }
        self.access_token = None;
        self.request_token();
    }

    fn request_token(&mut self) {
        if !self.token_requested {
            self.token_requested = true;
            self.outputs.push_back(EngineOutput::AccessTokenRequested);
        }
    }

    fn count_unexpected_close(&mut self, code: u16, reason: &str, clean: bool) {
        let now = self.clock.now();
        let short_lived = self
            .socket_opened_at
            .is_none_or(|opened| now.duration_since(opened) < self.timeouts.short_lived_socket);

        self.counters.unexpected_socket_close_count += 1;
        if short_lived {
            self.counters.short_lived_closed_socket_successive_count += 1;
        } else {
            self.counters.short_lived_closed_socket_successive_count = 0;
        }
        self.diagnostics.unexpected_socket_close(short_lived);
        tracing::warn!(
            code,
            reason,
            clean,
            short_lived,
            state = %self.state,
            "Feed socket closed unexpectedly"
        );
    }

    /// Start a reconnect while the socket may still be open.
    fn reconnect(&mut self, reason: ReconnectReason) {
        self.go_offline();
        self.note_reconnect(reason);
        self.pending_reason = Some(reason);
        self.disconnect();
    }

    /// Start a reconnect after the socket has already gone.
    fn reconnect_socket_closed(&mut self, reason: ReconnectReason) {
        self.go_offline();
        self.note_reconnect(reason);
        self.pending_reason = Some(reason);
        self.socket_gone();
    }

    fn note_reconnect(&mut self, reason: ReconnectReason) {
        if self.finalising {
            return;
        }
        self.counters.reconnect_count += 1;
        self.counters.last_reconnect_reason = Some(reason);
        self.diagnostics.reconnecting(reason);
        tracing::info!(reason = %reason, state = %self.state, "Reconnecting feed");
        self.outputs.push_back(EngineOutput::Reconnecting(reason));
    }

    fn disconnect(&mut self) {
        match self.state {
            ConnectionState::AuthActive | ConnectionState::AuthUpdate => {
                self.go_offline();
                self.begin_close();
            }
            ConnectionState::AuthFetch | ConnectionState::SocketOpen => self.begin_close(),
            ConnectionState::SocketClose | ConnectionState::Finalised => {}
            ConnectionState::Initialise
            | ConnectionState::AccessTokenWaiting
            | ConnectionState::ReconnectDelay => self.socket_gone(),
        }
    }

    fn begin_close(&mut self) {
        self.transition(ConnectionState::SocketClose);
        self.request(ConnectionAction::CloseSocket);
    }

    fn complete_close(&mut self) {
        self.socket_gone();
    }

    fn socket_gone(&mut self) {
        self.socket_opened_at = None;
        self.go_offline();
        match (self.finalising, self.pending_reason.take()) {
            (false, Some(reason)) => {
                self.transition(ConnectionState::ReconnectDelay);
                self.request(ConnectionAction::ReconnectDelay { reason });
            }
            _ => self.enter_finalised(),
        }
    }

    fn enter_finalised(&mut self) {
        self.finalising = true;
        self.token_update_pending = false;
        self.transition(ConnectionState::Finalised);
        self.outputs.push_back(EngineOutput::Finalised);
    }

    fn go_online(&mut self) {
        if self.online {
            return;
        }
        self.online = true;
        self.diagnostics.online_changed(true);
        tracing::info!(endpoint = ?self.active_endpoint, "Feed online");
        self.outputs.push_back(EngineOutput::CameOnline);
    }

    fn go_offline(&mut self) {
        if !self.online {
            return;
        }
        self.online = false;
        self.auth_expiry = None;
        self.diagnostics.online_changed(false);
        tracing::info!(state = %self.state, "Feed offline");
        self.outputs.push_back(EngineOutput::WentOffline);
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        self.wait_id = self.wait_id.next();
        self.state = to;
        tracing::debug!(from = %from, to = %to, wait_id = %self.wait_id, "Connection state changed");
        self.diagnostics.state_changed(from, to);
        self.outputs.push_back(EngineOutput::StateChanged {
            from,
            to,
            wait_id: self.wait_id,
        });
    }

    fn request(&mut self, action: ConnectionAction) {
        self.outputs.push_back(EngineOutput::Action(ActionRequest {
            action,
            wait_id: self.wait_id,
            timeout: self.timeouts.for_state(self.state),
        }));
    }

    fn expect_state(&self, expected: ConnectionState, event: &str) -> bool {
        if self.state == expected {
            return true;
        }
        tracing::debug!(
            event,
            state = %self.state,
            expected = %expected,
            "Ignoring connection event in unexpected state"
        );
        false
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use parking_lot::Mutex;

    use super::*;
    use crate::domain::connection::diagnostics::NoopDiagnostics;

    struct ManualClock(Mutex<Instant>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        reconnects: Mutex<Vec<ReconnectReason>>,
        timeouts: Mutex<Vec<ConnectionState>>,
    }

    impl DiagnosticsSink for RecordingSink {
        fn reconnecting(&self, reason: ReconnectReason) {
            self.reconnects.lock().push(reason);
        }

        fn timed_out(&self, state: ConnectionState) {
            self.timeouts.lock().push(state);
        }
    }

    fn engine_with(clock: Arc<ManualClock>) -> ConnectionStateEngine {
        ConnectionStateEngine::new(EngineTimeouts::default(), Arc::new(NoopDiagnostics), clock)
    }

    fn engine() -> ConnectionStateEngine {
        engine_with(ManualClock::new())
    }

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn actions(outputs: &[EngineOutput]) -> Vec<ActionRequest> {
        outputs
            .iter()
            .filter_map(|o| match o {
                EngineOutput::Action(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn reconnects(outputs: &[EngineOutput]) -> Vec<ReconnectReason> {
        outputs
            .iter()
            .filter_map(|o| match o {
                EngineOutput::Reconnecting(reason) => Some(*reason),
                _ => None,
            })
            .collect()
    }

    /// Drive a fresh engine to `AuthActive`.
    fn online_engine(clock: Arc<ManualClock>) -> ConnectionStateEngine {
        let mut engine = engine_with(clock);
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        assert!(engine.advise_socket_open_success());
        assert!(engine.advise_auth_fetch_success(expiry()));
        engine.take_outputs();
        engine
    }

    #[test]
    fn connects_when_endpoints_arrive_with_token() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);

        assert_eq!(engine.state(), ConnectionState::SocketOpen);
        let outputs = engine.take_outputs();
        let requests = actions(&outputs);
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].action,
            ConnectionAction::OpenSocket {
                endpoint: "wss://feed.example/1".to_string()
            }
        );
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(40)));
        assert_eq!(requests[0].wait_id, engine.wait_id());
        assert!(engine.diagnostics().connection_attempt_id.is_some());
    }

    #[test]
    fn waits_for_token_then_opens_socket() {
        let mut engine = engine();
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);

        assert_eq!(engine.state(), ConnectionState::AccessTokenWaiting);
        let outputs = engine.take_outputs();
        assert!(outputs.contains(&EngineOutput::AccessTokenRequested));
        assert!(actions(&outputs).is_empty());

        engine.update_access_token(AccessToken::new("t1"));
        assert_eq!(engine.state(), ConnectionState::SocketOpen);
    }

    #[test]
    fn empty_endpoints_leave_engine_idle() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(Vec::new());

        assert_eq!(engine.state(), ConnectionState::Initialise);
        assert!(engine.take_outputs().is_empty());
    }

    #[test]
    fn select_endpoint_picks_a_candidate() {
        let mut engine = engine();
        assert_eq!(engine.select_endpoint(), None);

        let candidates = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        engine.endpoints.clone_from(&candidates);
        for _ in 0..20 {
            let chosen = engine.select_endpoint().unwrap();
            assert!(candidates.contains(&chosen));
        }
    }

    #[test]
    fn open_then_auth_comes_online() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        engine.take_outputs();

        assert!(engine.advise_socket_open_success());
        assert_eq!(engine.state(), ConnectionState::AuthFetch);
        let requests = actions(&engine.take_outputs());
        assert_eq!(
            requests[0].action,
            ConnectionAction::FetchAuth {
                token: AccessToken::new("t1")
            }
        );

        assert!(engine.advise_auth_fetch_success(expiry()));
        assert_eq!(engine.state(), ConnectionState::AuthActive);
        assert!(engine.is_online());
        assert_eq!(engine.auth_expiry(), Some(expiry()));
        assert!(engine.take_outputs().contains(&EngineOutput::CameOnline));
    }

    #[test]
    fn connecting_error_goes_straight_to_reconnect_delay() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        engine.take_outputs();

        assert!(engine.advise_socket_connecting_error("refused"));

        assert_eq!(engine.state(), ConnectionState::ReconnectDelay);
        assert_eq!(engine.diagnostics().socket_connecting_successive_error_count, 1);
        let outputs = engine.take_outputs();
        assert_eq!(
            reconnects(&outputs),
            vec![ReconnectReason::SocketConnectingError]
        );
        let requests = actions(&outputs);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].timeout, None);

        assert!(engine.advise_reconnect_delay_completed());
        assert!(engine.advise_socket_open_success());
        assert_eq!(engine.diagnostics().socket_connecting_successive_error_count, 0);
    }

    #[test]
    fn events_in_wrong_state_are_ignored() {
        let mut engine = engine();
        assert!(!engine.advise_socket_open_success());
        assert!(!engine.advise_auth_fetch_success(expiry()));
        assert!(!engine.advise_reconnect_delay_completed());
        assert!(!engine.advise_socket_close(1000, "", true));
        assert_eq!(engine.state(), ConnectionState::Initialise);
        assert!(engine.take_outputs().is_empty());
    }

    #[test]
    fn stale_timeout_is_a_no_op() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        let armed = engine.wait_id();

        engine.advise_socket_open_success();
        engine.take_outputs();
        let before = engine.diagnostics();

        assert!(!engine.advise_timeout(armed));
        assert_eq!(engine.state(), ConnectionState::AuthFetch);
        assert_eq!(engine.diagnostics(), before);
        assert!(engine.take_outputs().is_empty());
        assert!(!engine.is_current_wait_id(armed));
    }

    #[test]
    fn current_timeout_reconnects_and_records_state() {
        let sink = Arc::new(RecordingSink::default());
        let mut engine = ConnectionStateEngine::new(
            EngineTimeouts::default(),
            sink.clone(),
            ManualClock::new(),
        );
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        engine.advise_socket_open_success();
        engine.take_outputs();

        assert!(engine.advise_timeout(engine.wait_id()));

        let diagnostics = engine.diagnostics();
        assert_eq!(diagnostics.timeout_count, 1);
        assert_eq!(diagnostics.last_timed_out_state, Some(ConnectionState::AuthFetch));
        assert_eq!(engine.state(), ConnectionState::SocketClose);
        let outputs = engine.take_outputs();
        assert_eq!(reconnects(&outputs), vec![ReconnectReason::Timeout]);
        let requests = actions(&outputs);
        assert_eq!(requests[0].action, ConnectionAction::CloseSocket);
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(5)));
        assert_eq!(*sink.timeouts.lock(), vec![ConnectionState::AuthFetch]);
        assert_eq!(*sink.reconnects.lock(), vec![ReconnectReason::Timeout]);

        // Close timeout completes the close.
        assert!(engine.advise_timeout(engine.wait_id()));
        assert_eq!(engine.state(), ConnectionState::ReconnectDelay);
        assert_eq!(engine.diagnostics().timeout_count, 2);
    }

    #[test]
    fn rejected_auth_discards_token_and_requests_new_one() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        engine.advise_socket_open_success();
        engine.take_outputs();

        assert!(engine.advise_auth_fetch_failure(true));
        let outputs = engine.take_outputs();
        assert!(outputs.contains(&EngineOutput::AccessTokenRequested));
        assert_eq!(reconnects(&outputs), vec![ReconnectReason::AuthRejected]);
        assert_eq!(engine.state(), ConnectionState::SocketClose);
        assert_eq!(engine.diagnostics().auth_fetch_successive_failure_count, 1);

        engine.advise_socket_close(1000, "bye", true);
        assert_eq!(engine.state(), ConnectionState::ReconnectDelay);

        engine.advise_reconnect_delay_completed();
        assert_eq!(engine.state(), ConnectionState::AccessTokenWaiting);
        // Already requested after the rejection.
        assert!(!engine.take_outputs().contains(&EngineOutput::AccessTokenRequested));
    }

    #[test]
    fn unrecoverable_auth_failure_finalises() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        engine.advise_socket_open_success();
        engine.take_outputs();

        engine.advise_auth_fetch_failure(false);
        assert_eq!(engine.state(), ConnectionState::SocketClose);
        assert!(engine.is_finalising());
        assert!(reconnects(&engine.take_outputs()).is_empty());

        engine.advise_socket_close(1000, "", true);
        assert_eq!(engine.state(), ConnectionState::Finalised);
        assert!(engine.take_outputs().contains(&EngineOutput::Finalised));
    }

    #[test]
    fn token_in_auth_active_updates_auth() {
        let mut engine = online_engine(ManualClock::new());

        engine.update_access_token(AccessToken::new("t2"));

        assert_eq!(engine.state(), ConnectionState::AuthUpdate);
        let requests = actions(&engine.take_outputs());
        assert_eq!(
            requests[0].action,
            ConnectionAction::UpdateAuth {
                token: AccessToken::new("t2")
            }
        );

        assert!(engine.advise_auth_update_success(expiry()));
        assert_eq!(engine.state(), ConnectionState::AuthActive);
        assert!(engine.is_online());
    }

    #[test]
    fn token_during_auth_fetch_updates_after_fetch() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        engine.advise_socket_open_success();
        engine.update_access_token(AccessToken::new("t2"));
        assert_eq!(engine.state(), ConnectionState::AuthFetch);
        engine.take_outputs();

        engine.advise_auth_fetch_success(expiry());

        assert_eq!(engine.state(), ConnectionState::AuthUpdate);
        let requests = actions(&engine.take_outputs());
        assert_eq!(
            requests[0].action,
            ConnectionAction::UpdateAuth {
                token: AccessToken::new("t2")
            }
        );
    }

    #[test]
    fn refresh_failure_reconnects() {
        let mut engine = online_engine(ManualClock::new());
        engine.update_access_token(AccessToken::new("t2"));
        engine.take_outputs();

        engine.advise_auth_update_failure(false);

        let outputs = engine.take_outputs();
        assert_eq!(outputs[0], EngineOutput::WentOffline);
        assert_eq!(reconnects(&outputs), vec![ReconnectReason::AuthRefreshFailed]);
        assert_eq!(engine.diagnostics().auth_refresh_successive_failure_count, 1);
        assert_eq!(engine.state(), ConnectionState::SocketClose);
    }

    #[test]
    fn unexpected_close_counts_short_lived_sockets() {
        let clock = ManualClock::new();
        let mut engine = online_engine(clock.clone());

        assert!(engine.advise_socket_close(1006, "abnormal", false));

        let diagnostics = engine.diagnostics();
        assert_eq!(diagnostics.unexpected_socket_close_count, 1);
        assert_eq!(diagnostics.short_lived_closed_socket_successive_count, 1);
        assert_eq!(engine.state(), ConnectionState::ReconnectDelay);
        let outputs = engine.take_outputs();
        assert_eq!(outputs[0], EngineOutput::WentOffline);
        assert_eq!(
            reconnects(&outputs),
            vec![ReconnectReason::UnexpectedSocketClose]
        );

        engine.advise_reconnect_delay_completed();
        engine.advise_socket_open_success();
        engine.advise_auth_fetch_success(expiry());
        clock.advance(Duration::from_secs(30));

        engine.advise_socket_close(1006, "abnormal", false);

        let diagnostics = engine.diagnostics();
        assert_eq!(diagnostics.unexpected_socket_close_count, 2);
        assert_eq!(diagnostics.short_lived_closed_socket_successive_count, 0);
    }

    #[test]
    fn new_endpoints_while_online_reconnect() {
        let mut engine = online_engine(ManualClock::new());

        engine.update_endpoints(vec!["wss://feed.example/2".to_string()]);

        let outputs = engine.take_outputs();
        assert_eq!(outputs[0], EngineOutput::WentOffline);
        assert_eq!(reconnects(&outputs), vec![ReconnectReason::NewEndpoints]);
        assert_eq!(engine.state(), ConnectionState::SocketClose);

        engine.advise_socket_close(1000, "", true);
        engine.advise_reconnect_delay_completed();
        assert_eq!(engine.active_endpoint(), Some("wss://feed.example/2"));
    }

    #[test]
    fn closing_error_counts_and_completes_close() {
        let mut engine = online_engine(ManualClock::new());
        engine.update_endpoints(vec!["wss://feed.example/2".to_string()]);

        assert!(engine.advise_socket_closing_error("broken pipe"));

        assert_eq!(engine.diagnostics().socket_closing_successive_error_count, 1);
        assert_eq!(engine.state(), ConnectionState::ReconnectDelay);
    }

    #[test]
    fn closed_error_reconnects() {
        let mut engine = online_engine(ManualClock::new());

        assert!(engine.advise_socket_closed_error("reset by peer"));

        assert_eq!(engine.state(), ConnectionState::ReconnectDelay);
        assert_eq!(
            reconnects(&engine.take_outputs()),
            vec![ReconnectReason::SocketClosedError]
        );
    }

    #[test]
    fn finalise_from_reconnect_delay_is_immediate() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        engine.advise_socket_connecting_error("refused");
        engine.take_outputs();

        engine.finalise(false);

        assert_eq!(engine.state(), ConnectionState::Finalised);
        assert!(engine.take_outputs().contains(&EngineOutput::Finalised));
        assert!(!engine.advise_reconnect_delay_completed());

        engine.update_endpoints(vec!["wss://feed.example/2".to_string()]);
        assert_eq!(engine.state(), ConnectionState::Finalised);
    }

    #[test]
    fn finalise_with_closed_socket_goes_offline_first() {
        let mut engine = online_engine(ManualClock::new());

        engine.finalise(true);

        let outputs = engine.take_outputs();
        assert_eq!(outputs[0], EngineOutput::WentOffline);
        assert_eq!(outputs.last(), Some(&EngineOutput::Finalised));
        assert!(actions(&outputs).is_empty());
        assert_eq!(engine.state(), ConnectionState::Finalised);
    }

    #[test]
    fn finalise_while_online_closes_socket_without_reconnecting() {
        let mut engine = online_engine(ManualClock::new());

        engine.finalise(false);
        assert_eq!(engine.state(), ConnectionState::SocketClose);

        engine.advise_socket_close(1000, "", true);

        let outputs = engine.take_outputs();
        assert!(reconnects(&outputs).is_empty());
        assert_eq!(engine.state(), ConnectionState::Finalised);
    }

    #[test]
    fn wait_ids_increase_on_every_transition() {
        let mut engine = engine();
        engine.update_access_token(AccessToken::new("t1"));
        engine.update_endpoints(vec!["wss://feed.example/1".to_string()]);
        engine.advise_socket_open_success();
        engine.advise_auth_fetch_success(expiry());

        let ids: Vec<WaitId> = engine
            .take_outputs()
            .into_iter()
            .filter_map(|o| match o {
                EngineOutput::StateChanged { wait_id, .. } => Some(wait_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
