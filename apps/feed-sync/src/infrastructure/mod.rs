//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports, the tokio host for
//! the connection engine, and the ambient stack.

/// Reconnect delay backoff.
pub mod backoff;

/// Environment configuration.
pub mod config;

/// Tokio host for the connection state engine.
pub mod driver;

/// Prometheus metrics and diagnostics sink.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry export.
pub mod telemetry;

/// WebSocket feed transport.
pub mod websocket;
