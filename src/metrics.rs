//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Requests issued, by scheme and outcome
//! - Rejected (unsupported) schemes
//! - Connection establishment latency
//! - Pooled connection reuse
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_agent_` and follow Prometheus
//! conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)
//!
//! # Usage
//!
//! ```rust,no_run
//! use replication_agent::metrics;
//! use std::time::Duration;
//!
//! metrics::record_connect_latency("tcp", Duration::from_millis(3));
//! metrics::record_request(b"https", "success", Duration::from_millis(40));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

fn label(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Record a completed request (headers received or failed).
///
/// `outcome` is `"success"` or an error kind from
/// [`AgentError::kind`](crate::AgentError::kind).
pub fn record_request(scheme: &[u8], outcome: &'static str, latency: Duration) {
    let scheme = label(scheme);
    counter!("replication_agent_requests_total", "scheme" => scheme.clone(), "outcome" => outcome).increment(1);
    histogram!("replication_agent_request_duration_seconds", "scheme" => scheme).record(latency.as_secs_f64());
}

/// Record a request rejected for its scheme.
pub fn record_unsupported_scheme() {
    counter!("replication_agent_unsupported_scheme_total").increment(1);
}

/// Record connection establishment latency.
///
/// `stage` is `"tcp"` for the TCP connect or `"tls_handshake"` for the TLS
/// negotiation layered on top.
pub fn record_connect_latency(stage: &'static str, latency: Duration) {
    histogram!("replication_agent_connect_duration_seconds", "stage" => stage).record(latency.as_secs_f64());
}

/// Record a connection handed out by the pool.
pub fn record_connection_acquired(scheme: &[u8], reused: bool) {
    let source = if reused { "reused" } else { "new" };
    counter!("replication_agent_connections_total", "scheme" => label(scheme), "source" => source).increment(1);
}

/// A connection was parked for reuse.
///
/// The idle gauge moves by deltas so several pools in one process add up
/// instead of overwriting each other.
pub fn record_idle_parked() {
    gauge!("replication_agent_idle_connections").increment(1.0);
}

/// `count` parked connections left the pool (reused, expired or closed).
pub fn record_idle_removed(count: usize) {
    if count > 0 {
        gauge!("replication_agent_idle_connections").decrement(count as f64);
    }
}
