//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
///
/// Used by tests and embedders that do not need a `/metrics` body.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections accepted while over the advisory limit (counter).
pub const WS_CONNECTIONS_OVER_LIMIT_TOTAL: &str = "ws_connections_over_limit_total";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound messages routed (counter, labels: type).
pub const MESSAGES_ROUTED_TOTAL: &str = "messages_routed_total";
/// Connections closed for protocol violations (counter, labels: kind).
pub const PROTOCOL_VIOLATIONS_TOTAL: &str = "protocol_violations_total";
/// Panics caught while routing a message (counter).
pub const ROUTER_PANICS_TOTAL: &str = "router_panics_total";
/// Broadcast frames delivered (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Broadcast frames dropped (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
/// Events ingested (counter, labels: source).
pub const EVENTS_INGESTED_TOTAL: &str = "events_ingested_total";
/// Sessions created (counter).
pub const SESSIONS_CREATED_TOTAL: &str = "sessions_created_total";
/// Sessions removed (counter, labels: reason).
pub const SESSIONS_REMOVED_TOTAL: &str = "sessions_removed_total";
/// Live sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
