//! Feed Connection
//!
//! Connection resilience state machine and its vocabulary: states, wait
//! ids, actions, reconnect reasons and diagnostic counters.

mod action;
mod diagnostics;
mod engine;
mod reason;
mod state;

pub use action::{AccessToken, ActionRequest, ConnectionAction, EngineTimeouts};
pub use diagnostics::{
    Clock, ConnectionDiagnostics, DiagnosticsSink, NoopDiagnostics, SystemClock,
};
pub use engine::{ConnectionStateEngine, EngineOutput};
pub use reason::ReconnectReason;
pub use state::{ConnectionState, WaitId};
