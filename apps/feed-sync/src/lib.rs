#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Feed Sync - Streaming Entity Synchronisation Core
//!
//! Keeps local, indexed collections of server-owned trading entities in
//! step with a streaming feed, and keeps the feed connection itself alive.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: pure types and state machines
//!   - `correctness`: correctness lattice and badness
//!   - `record_list`: keyed record list and list changes
//!   - `aurc`: Add/Update/Remove/Clear change records
//!   - `entities`: orders, holdings, balances, trades, symbols, scans,
//!     watch-list entries
//!   - `connection`: connection state engine
//!
//! - **Application**: subscriptions, reconciliation and ports
//!   - `services`: subscription data items, AURC reconciliation, sessions
//!   - `ports`: transport, auth, frame handler, diagnostics, clock
//!
//! - **Infrastructure**: adapters
//!   - `driver`: tokio host for the connection engine
//!   - `websocket`: tokio-tungstenite transport
//!   - `backoff`: reconnect delay
//!   - `config`: `FEED_*` environment configuration
//!   - `metrics`: Prometheus diagnostics sink
//!   - `telemetry`: tracing subscriber and OTLP export
//!
//! # Data Flow
//!
//! ```text
//! socket ──► driver ──► FrameHandler (decoder) ──► DataMessage
//!              │                                     │
//!              ▼                                     ▼
//!     ConnectionStateEngine ──► online/offline ──► FeedSession ──► RecordListDataItem
//!                                                                   │
//!                                        ListChange / RecordChange ◄┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure synchronisation types and state machines.
pub mod domain;

/// Application layer - Subscriptions, reconciliation and ports.
pub mod application;

/// Infrastructure layer - Driver, transport and ambient adapters.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::aurc::{ChangeRecord, ClearScope, DataAnomaly, ReconcilableRecord};
pub use domain::catalog::{Account, AccountCode, AccountsCatalog, MarketCode};
pub use domain::connection::{
    AccessToken, ConnectionDiagnostics, ConnectionState, ConnectionStateEngine, EngineOutput,
    EngineTimeouts, ReconnectReason, WaitId,
};
pub use domain::correctness::{Badness, BadnessReason, Correctness};
pub use domain::notify::{EventHandle, MultiEvent};
pub use domain::record_list::{KeyedRecord, KeyedRecordList, ListChange, ListChangeKind};

// Services
pub use application::services::{
    DataMessage, DataMessagePayload, DuplicateAddPolicy, FeedSession, RecordChange,
    RecordListDataItem, SubscriptionDataItem,
};

// Infrastructure
pub use infrastructure::config::{ConfigError, FeedConfig};
pub use infrastructure::driver::{
    ConnectionDriver, DriverCommand, DriverError, DriverEvent, DriverHandle, DriverPorts,
};
pub use infrastructure::metrics::{MetricsDiagnostics, init_metrics};
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
pub use infrastructure::websocket::WebSocketTransport;
