//! Metric names and recording helpers.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use metrics::{counter, gauge};

/// Total number of TCP connections accepted.
pub const CONNECTIONS_TOTAL: &str = "conn_tease_connections_total";
/// Number of connections currently being sniffed or relayed.
pub const CONNECTIONS_ACTIVE: &str = "conn_tease_connections_active";
/// Connections routed to a backend, labelled by route.
pub const ROUTED_TOTAL: &str = "conn_tease_routed_total";
/// Connections dropped while sniffing.
pub const DETECTION_FAILURES_TOTAL: &str = "conn_tease_detection_failures_total";
/// Backend connection failures, labelled by route.
pub const BACKEND_FAILURES_TOTAL: &str = "conn_tease_backend_failures_total";
/// Bytes relayed from clients to backends.
pub const BYTES_UPSTREAM_TOTAL: &str = "conn_tease_bytes_upstream_total";
/// Bytes relayed from backends to clients.
pub const BYTES_DOWNSTREAM_TOTAL: &str = "conn_tease_bytes_downstream_total";

/// Record a new connection accepted.
#[inline]
pub fn record_connection_accepted() {
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a connection finished, however it ended.
#[inline]
pub fn record_connection_closed() {
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record the route chosen for a connection.
#[inline]
pub fn record_routed(route: &'static str) {
    counter!(ROUTED_TOTAL, "route" => route).increment(1);
}

#[inline]
pub fn record_detection_failure() {
    counter!(DETECTION_FAILURES_TOTAL).increment(1);
}

#[inline]
pub fn record_backend_failure(route: &'static str) {
    counter!(BACKEND_FAILURES_TOTAL, "route" => route).increment(1);
}

/// Record relayed byte counts for one connection.
#[inline]
pub fn record_relayed(upstream: u64, downstream: u64) {
    counter!(BYTES_UPSTREAM_TOTAL).increment(upstream);
    counter!(BYTES_DOWNSTREAM_TOTAL).increment(downstream);
}
