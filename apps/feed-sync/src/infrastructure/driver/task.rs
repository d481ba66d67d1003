//! Driver event loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::{DriverCommand, DriverEvent, DriverPorts};
use crate::application::ports::{AuthFailure, SocketEvent, TransportError};
use crate::domain::connection::{
    AccessToken, ActionRequest, ConnectionAction, ConnectionDiagnostics, ConnectionState,
    ConnectionStateEngine, EngineOutput, WaitId,
};
use crate::infrastructure::backoff::{Backoff, BackoffConfig};

/// Identifies one opened socket so events from a replaced socket are
/// dropped.
type SocketId = u64;

/// Result of work spawned by the driver.
#[derive(Debug)]
enum Completion {
    SocketOpened {
        wait_id: WaitId,
        socket: SocketId,
        result: Result<(), TransportError>,
    },
    AuthFetched {
        wait_id: WaitId,
        result: Result<DateTime<Utc>, AuthFailure>,
    },
    AuthUpdated {
        wait_id: WaitId,
        result: Result<DateTime<Utc>, AuthFailure>,
    },
    CloseStarted {
        wait_id: WaitId,
        result: Result<(), TransportError>,
    },
    Socket {
        socket: SocketId,
        event: SocketEvent,
    },
    TimedOut(WaitId),
    DelayElapsed(WaitId),
}

pub(super) struct DriverTask {
    engine: ConnectionStateEngine,
    ports: DriverPorts,
    backoff: Backoff,
    commands: mpsc::Receiver<DriverCommand>,
    commands_open: bool,
    events: broadcast::Sender<DriverEvent>,
    cancel: CancellationToken,
    timers: CancellationToken,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    socket: SocketId,
}

impl DriverTask {
    pub(super) fn new(
        engine: ConnectionStateEngine,
        ports: DriverPorts,
        backoff: BackoffConfig,
        commands: mpsc::Receiver<DriverCommand>,
        events: broadcast::Sender<DriverEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            ports,
            backoff: Backoff::new(backoff),
            commands,
            commands_open: true,
            events,
            timers: cancel.child_token(),
            cancel,
            completion_tx,
            completion_rx,
            socket: 0,
        }
    }

    pub(super) async fn run(
        mut self,
        access_token: Option<AccessToken>,
        endpoints: Vec<String>,
    ) -> ConnectionDiagnostics {
        tracing::info!(endpoints = endpoints.len(), "Connection driver started");

        if let Some(token) = access_token {
            self.engine.update_access_token(token);
        }
        if !endpoints.is_empty() {
            self.engine.update_endpoints(endpoints);
        }
        self.drain_outputs();

        while self.engine.state() != ConnectionState::Finalised {
            let finalising = self.engine.is_finalising();
            tokio::select! {
                () = self.cancel.cancelled(), if !finalising => {
                    tracing::info!("Connection driver cancelled");
                    self.engine.finalise(false);
                }
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::info!("All driver handles dropped, finalising");
                        self.commands_open = false;
                        self.engine.finalise(false);
                    }
                },
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                }
            }
            self.drain_outputs();
        }

        self.timers.cancel();
        let _ = self.events.send(DriverEvent::Stopped);
        let diagnostics = self.engine.diagnostics();
        tracing::info!(
            reconnects = diagnostics.reconnect_count,
            timeouts = diagnostics.timeout_count,
            "Connection driver stopped"
        );
        diagnostics
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    fn handle_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::UpdateEndpoints(endpoints) => self.engine.update_endpoints(endpoints),
            DriverCommand::UpdateAccessToken(token) => self.engine.update_access_token(token),
            DriverCommand::Send { frame, reply } => {
                if !self.engine.state().has_socket() {
                    let _ = reply.send(Err(TransportError::NotConnected));
                    return;
                }
                let transport = Arc::clone(&self.ports.transport);
                tokio::spawn(async move {
                    let _ = reply.send(transport.send(frame).await);
                });
            }
            DriverCommand::Diagnostics(reply) => {
                let _ = reply.send(self.engine.diagnostics());
            }
            DriverCommand::Finalise => self.engine.finalise(false),
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::SocketOpened {
                wait_id,
                socket,
                result,
            } => {
                if !self.engine.is_current_wait_id(wait_id) {
                    tracing::debug!(wait_id = %wait_id, ok = result.is_ok(), "Late socket open");
                    if result.is_ok() && socket == self.socket {
                        self.close_orphan();
                    }
                    return;
                }
                match result {
                    Ok(()) => self.engine.advise_socket_open_success(),
                    Err(e) => self.engine.advise_socket_connecting_error(&e.to_string()),
                };
            }
            Completion::AuthFetched { wait_id, result } => {
                if !self.is_current(wait_id, "auth_fetch") {
                    return;
                }
                match result {
                    Ok(expiry) => self.engine.advise_auth_fetch_success(expiry),
                    Err(failure) => self.engine.advise_auth_fetch_failure(failure.is_rejected()),
                };
            }
            Completion::AuthUpdated { wait_id, result } => {
                if !self.is_current(wait_id, "auth_update") {
                    return;
                }
                match result {
                    Ok(expiry) => self.engine.advise_auth_update_success(expiry),
                    Err(failure) => self.engine.advise_auth_update_failure(failure.is_rejected()),
                };
            }
            Completion::CloseStarted { wait_id, result } => {
                if let Err(e) = result
                    && self.is_current(wait_id, "close_socket")
                {
                    self.engine.advise_socket_closing_error(&e.to_string());
                }
            }
            Completion::Socket { socket, event } => self.handle_socket_event(socket, event),
            Completion::TimedOut(wait_id) => {
                self.engine.advise_timeout(wait_id);
            }
            Completion::DelayElapsed(wait_id) => {
                if self.is_current(wait_id, "reconnect_delay") {
                    self.engine.advise_reconnect_delay_completed();
                }
            }
        }
    }

    fn handle_socket_event(&mut self, socket: SocketId, event: SocketEvent) {
        if socket != self.socket {
            tracing::trace!(socket, current = self.socket, "Dropping event from old socket");
            return;
        }
        match event {
            SocketEvent::Frame(frame) => {
                if self.engine.state().has_socket() {
                    self.ports.frames.handle_frame(&frame);
                }
            }
            SocketEvent::Closed {
                code,
                reason,
                clean,
            } => {
                if self.engine.state().has_socket()
                    || self.engine.state() == ConnectionState::SocketClose
                {
                    self.engine.advise_socket_close(code, &reason, clean);
                }
            }
            SocketEvent::Error(error) => {
                if self.engine.state().has_socket()
                    || self.engine.state() == ConnectionState::SocketClose
                {
                    self.engine.advise_socket_closed_error(&error);
                }
            }
        }
    }

    fn is_current(&self, wait_id: WaitId, action: &'static str) -> bool {
        let current = self.engine.is_current_wait_id(wait_id);
        if !current {
            tracing::debug!(action, wait_id = %wait_id, "Dropping late completion");
        }
        current
    }

    // -------------------------------------------------------------------------
    // Outputs
    // -------------------------------------------------------------------------

    fn drain_outputs(&mut self) {
        loop {
            let outputs = self.engine.take_outputs();
            if outputs.is_empty() {
                return;
            }
            for output in outputs {
                match &output {
                    EngineOutput::Action(request) => self.execute(request),
                    EngineOutput::CameOnline => self.backoff.reset(),
                    EngineOutput::StateChanged { .. }
                    | EngineOutput::WentOffline
                    | EngineOutput::Reconnecting(_)
                    | EngineOutput::AccessTokenRequested
                    | EngineOutput::Finalised => {}
                }
                // No receivers is fine.
                let _ = self.events.send(DriverEvent::Engine(output));
            }
        }
    }

    fn execute(&mut self, request: &ActionRequest) {
        let wait_id = request.wait_id;
        tracing::debug!(action = request.action.name(), wait_id = %wait_id, "Executing action");

        if let Some(timeout) = request.timeout {
            self.arm(timeout, Completion::TimedOut(wait_id));
        }

        let tx = self.completion_tx.clone();
        match &request.action {
            ConnectionAction::OpenSocket { endpoint } => {
                self.socket += 1;
                let socket = self.socket;
                let (socket_tx, mut socket_rx) = mpsc::unbounded_channel();

                let forward = tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = socket_rx.recv().await {
                        if forward.send(Completion::Socket { socket, event }).is_err() {
                            break;
                        }
                    }
                });

                let transport = Arc::clone(&self.ports.transport);
                let endpoint = endpoint.clone();
                tokio::spawn(async move {
                    let result = transport.open(&endpoint, socket_tx).await;
                    let _ = tx.send(Completion::SocketOpened {
                        wait_id,
                        socket,
                        result,
                    });
                });
            }
            ConnectionAction::FetchAuth { token } => {
                let auth = Arc::clone(&self.ports.auth);
                let token = token.clone();
                tokio::spawn(async move {
                    let result = auth.fetch_auth(&token).await;
                    let _ = tx.send(Completion::AuthFetched { wait_id, result });
                });
            }
            ConnectionAction::UpdateAuth { token } => {
                let auth = Arc::clone(&self.ports.auth);
                let token = token.clone();
                tokio::spawn(async move {
                    let result = auth.update_auth(&token).await;
                    let _ = tx.send(Completion::AuthUpdated { wait_id, result });
                });
            }
            ConnectionAction::CloseSocket => {
                let transport = Arc::clone(&self.ports.transport);
                tokio::spawn(async move {
                    let result = transport.close().await;
                    let _ = tx.send(Completion::CloseStarted { wait_id, result });
                });
            }
            ConnectionAction::ReconnectDelay { reason } => {
                let delay = self.backoff.next_delay();
                tracing::info!(
                    reason = %reason,
                    attempt = self.backoff.attempts(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Reconnecting after delay"
                );
                self.arm(delay, Completion::DelayElapsed(wait_id));
            }
        }
    }

    fn arm(&self, after: Duration, completion: Completion) {
        let tx = self.completion_tx.clone();
        let timers = self.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = timers.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    let _ = tx.send(completion);
                }
            }
        });
    }

    fn close_orphan(&self) {
        let transport = Arc::clone(&self.ports.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.close().await {
                tracing::debug!(error = %e, "Failed to close orphaned socket");
            }
        });
    }
}
