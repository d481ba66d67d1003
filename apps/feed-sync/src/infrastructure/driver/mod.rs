//! Connection Driver
//!
//! Hosts a [`ConnectionStateEngine`] inside one tokio task and carries out
//! its actions through the transport and auth ports.
//!
//! - Commands arrive on an `mpsc` channel ([`DriverCommand`]).
//! - Port calls run as spawned futures whose completions come back to the
//!   task tagged with the wait id that issued them.
//! - Timeouts and reconnect delays are `tokio::time::sleep` timers tagged
//!   with the same wait id; the engine ignores stale ones.
//! - Every engine output is published on a `broadcast` channel
//!   ([`DriverEvent`]).
//!
//! The task stops when the engine reaches `Finalised`. Cancelling the
//! driver's [`CancellationToken`] or dropping every [`DriverHandle`]
//! finalises the engine first.

mod task;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AuthPort, Clock, DiagnosticsSink, FeedTransport, FrameHandler, SystemClock, TransportError,
};
use crate::domain::connection::{
    AccessToken, ConnectionDiagnostics, ConnectionStateEngine, EngineOutput,
};
use crate::infrastructure::config::FeedConfig;

// =============================================================================
// Types
// =============================================================================

/// Request to the driver task.
#[derive(Debug)]
pub enum DriverCommand {
    /// Replace the candidate endpoints.
    UpdateEndpoints(Vec<String>),
    /// Supply a new access token.
    UpdateAccessToken(AccessToken),
    /// Send a frame on the open socket.
    Send {
        /// Frame text.
        frame: String,
        /// Outcome of the send.
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    /// Snapshot the diagnostic counters.
    Diagnostics(oneshot::Sender<ConnectionDiagnostics>),
    /// Shut the connection down for good.
    Finalise,
}

/// Published by the driver task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// An engine output, in the order the engine produced it.
    Engine(EngineOutput),
    /// The driver task has stopped.
    Stopped,
}

/// Driver error.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The driver task is no longer running.
    #[error("connection driver stopped")]
    Stopped,

    /// The send failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The driver task panicked or was aborted.
    #[error("connection driver task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Adapters the driver talks to.
#[derive(Clone)]
pub struct DriverPorts {
    /// Feed socket.
    pub transport: Arc<dyn FeedTransport>,
    /// Feed authorisation.
    pub auth: Arc<dyn AuthPort>,
    /// Receiver of inbound frames.
    pub frames: Arc<dyn FrameHandler>,
    /// Diagnostics sink handed to the engine.
    pub diagnostics: Arc<dyn DiagnosticsSink>,
    /// Clock handed to the engine.
    pub clock: Arc<dyn Clock>,
}

impl DriverPorts {
    /// Ports with the system clock.
    #[must_use]
    pub fn new(
        transport: Arc<dyn FeedTransport>,
        auth: Arc<dyn AuthPort>,
        frames: Arc<dyn FrameHandler>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            transport,
            auth,
            frames,
            diagnostics,
            clock: Arc::new(SystemClock),
        }
    }
}

impl std::fmt::Debug for DriverPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverPorts").finish_non_exhaustive()
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable sender of driver commands.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<DriverCommand>,
    events: broadcast::Sender<DriverEvent>,
}

impl DriverHandle {
    /// Subscribe to driver events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }

    /// Replace the candidate endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Stopped`] if the driver has stopped.
    pub async fn update_endpoints(&self, endpoints: Vec<String>) -> Result<(), DriverError> {
        self.command(DriverCommand::UpdateEndpoints(endpoints)).await
    }

    /// Supply a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Stopped`] if the driver has stopped.
    pub async fn update_access_token(&self, token: AccessToken) -> Result<(), DriverError> {
        self.command(DriverCommand::UpdateAccessToken(token)).await
    }

    /// Send a frame on the open socket.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Transport`] if no socket is open or the send
    /// fails.
    pub async fn send(&self, frame: String) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.command(DriverCommand::Send { frame, reply }).await?;
        let result = rx.await.map_err(|_| DriverError::Stopped)?;
        result.map_err(DriverError::from)
    }

    /// Snapshot the engine's diagnostic counters.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Stopped`] if the driver has stopped.
    pub async fn diagnostics(&self) -> Result<ConnectionDiagnostics, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.command(DriverCommand::Diagnostics(reply)).await?;
        rx.await.map_err(|_| DriverError::Stopped)
    }

    /// Shut the connection down for good.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Stopped`] if the driver has already stopped.
    pub async fn finalise(&self) -> Result<(), DriverError> {
        self.command(DriverCommand::Finalise).await
    }

    async fn command(&self, command: DriverCommand) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DriverError::Stopped)
    }
}

// =============================================================================
// Driver
// =============================================================================

/// A running connection driver.
#[derive(Debug)]
pub struct ConnectionDriver {
    handle: DriverHandle,
    first_events: Option<broadcast::Receiver<DriverEvent>>,
    cancel: CancellationToken,
    task: JoinHandle<ConnectionDiagnostics>,
}

impl ConnectionDriver {
    /// Spawn the driver task. Connecting starts immediately with the
    /// configured endpoints and token.
    #[must_use]
    pub fn spawn(config: &FeedConfig, ports: DriverPorts) -> Self {
        Self::spawn_with_cancel(config, ports, CancellationToken::new())
    }

    /// Spawn the driver task, finalising when `cancel` fires.
    #[must_use]
    pub fn spawn_with_cancel(
        config: &FeedConfig,
        ports: DriverPorts,
        cancel: CancellationToken,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(config.channels.command_capacity);
        let (events, first_events) = broadcast::channel(config.channels.event_capacity);

        let engine = ConnectionStateEngine::new(
            config.engine_timeouts(),
            Arc::clone(&ports.diagnostics),
            Arc::clone(&ports.clock),
        );
        let driver_task = task::DriverTask::new(
            engine,
            ports,
            config.reconnect,
            command_rx,
            events.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(driver_task.run(
            config.access_token.clone(),
            config.endpoints.clone(),
        ));

        Self {
            handle: DriverHandle { commands, events },
            first_events: Some(first_events),
            cancel,
            task,
        }
    }

    /// Command handle.
    #[must_use]
    pub fn handle(&self) -> DriverHandle {
        self.handle.clone()
    }

    /// Event receiver. The first call returns a receiver holding every
    /// event since spawn; later calls subscribe from now on.
    pub fn events(&mut self) -> broadcast::Receiver<DriverEvent> {
        self.first_events
            .take()
            .unwrap_or_else(|| self.handle.subscribe())
    }

    /// Finalise the connection and stop the task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to stop. Returns the final diagnostic counters.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Join`] if the task panicked.
    pub async fn join(self) -> Result<ConnectionDiagnostics, DriverError> {
        Ok(self.task.await?)
    }
}
