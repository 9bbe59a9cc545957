//! Metrics collection.
//!
//! # Metrics
//! - `wess_ready` (gauge): 1 while the server reports ready, 0 otherwise
//! - `wess_probe_requests_total` (counter): probe hits by probe and status
//! - `wess_startup_failures_total` (counter): failed binds by listener
//! - `wess_connections_active` (gauge): open connections by listener
//! - `wess_connections_total` (counter): accepted connections by listener
//! - `wess_shutdown_duration_seconds` (histogram): drain time by outcome
//!
//! # Design Decisions
//! - Only the `metrics` facade is used; installing an exporter is up to the binary
//! - Labels are static strings to keep updates allocation-free

use std::time::Duration;

use crate::net::ListenerKind;

pub fn set_ready(ready: bool) {
    metrics::gauge!("wess_ready").set(if ready { 1.0 } else { 0.0 });
}

pub fn record_probe(probe: &'static str, status: u16) {
    metrics::counter!(
        "wess_probe_requests_total",
        "probe" => probe,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_startup_failure(listener: ListenerKind) {
    metrics::counter!("wess_startup_failures_total", "listener" => listener.as_str()).increment(1);
}

pub fn connection_opened(listener: ListenerKind) {
    metrics::counter!("wess_connections_total", "listener" => listener.as_str()).increment(1);
    metrics::gauge!("wess_connections_active", "listener" => listener.as_str()).increment(1.0);
}

pub fn connection_closed(listener: ListenerKind) {
    metrics::gauge!("wess_connections_active", "listener" => listener.as_str()).decrement(1.0);
}

pub fn record_shutdown(elapsed: Duration, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    metrics::histogram!("wess_shutdown_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}
