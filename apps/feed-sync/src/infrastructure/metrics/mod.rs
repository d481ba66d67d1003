//! Prometheus Metrics Module
//!
//! Feed connection and reconciliation metrics in Prometheus format.
//!
//! # Metrics
//!
//! - `feed_sync_state_transitions_total{from,to}`
//! - `feed_sync_reconnects_total{reason}`
//! - `feed_sync_timeouts_total{state}`
//! - `feed_sync_unexpected_socket_closes_total{short_lived}`
//! - `feed_sync_data_anomalies_total{code,entity}`
//! - `feed_sync_online` (0 or 1)
//!
//! [`MetricsDiagnostics`] records them as a [`DiagnosticsSink`]; render
//! them with the handle returned by [`init_metrics`].

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::aurc::DataAnomaly;
use crate::domain::connection::{ConnectionState, DiagnosticsSink, ReconnectReason};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<Result<PrometheusHandle, MetricsError>> = OnceLock::new();

/// Metrics initialisation error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to install Prometheus recorder: {0}")]
pub struct MetricsError(String);

/// Install the Prometheus recorder. Later calls return the outcome of the
/// first.
///
/// # Errors
///
/// Returns an error if another recorder was already installed.
pub fn init_metrics() -> Result<PrometheusHandle, MetricsError> {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| MetricsError(e.to_string()))?;
            register_metrics();
            Ok(handle)
        })
        .clone()
}

/// Prometheus handle, if metrics have been initialised.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get()
        .and_then(|result| result.as_ref().ok())
        .cloned()
}

fn register_metrics() {
    describe_counter!(
        "feed_sync_state_transitions_total",
        "Connection state transitions"
    );
    describe_counter!("feed_sync_reconnects_total", "Reconnects by reason");
    describe_counter!(
        "feed_sync_timeouts_total",
        "Connection actions that timed out, by state"
    );
    describe_counter!(
        "feed_sync_unexpected_socket_closes_total",
        "Sockets closed by the server or network"
    );
    describe_counter!(
        "feed_sync_data_anomalies_total",
        "Change records that could not be applied, by anomaly code"
    );
    describe_gauge!("feed_sync_online", "Whether the feed is authorised and online");
}

// =============================================================================
// Diagnostics Sink
// =============================================================================

/// Diagnostics sink recording Prometheus metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsDiagnostics;

impl DiagnosticsSink for MetricsDiagnostics {
    fn state_changed(&self, from: ConnectionState, to: ConnectionState) {
        counter!(
            "feed_sync_state_transitions_total",
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
    }

    fn reconnecting(&self, reason: ReconnectReason) {
        counter!("feed_sync_reconnects_total", "reason" => reason.as_str()).increment(1);
    }

    fn timed_out(&self, state: ConnectionState) {
        counter!("feed_sync_timeouts_total", "state" => state.as_str()).increment(1);
    }

    fn unexpected_socket_close(&self, short_lived: bool) {
        counter!(
            "feed_sync_unexpected_socket_closes_total",
            "short_lived" => if short_lived { "true" } else { "false" }
        )
        .increment(1);
    }

    fn online_changed(&self, online: bool) {
        gauge!("feed_sync_online").set(if online { 1.0 } else { 0.0 });
    }

    fn data_anomaly(&self, anomaly: &DataAnomaly) {
        counter!(
            "feed_sync_data_anomalies_total",
            "code" => anomaly.code(),
            "entity" => anomaly.entity()
        )
        .increment(1);
    }
}

// =============================================================================
// Tests
// =============================================================================
