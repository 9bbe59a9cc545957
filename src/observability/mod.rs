//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! HTTP traffic:
//!     → tower-http TraceLayer spans (probe traffic only with trace_probe)
//!     → x-request-id set and propagated (http/request.rs)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (listener, address, path)
//! - Request ID flows through every application request
//! - Metrics are cheap (atomic increments behind the facade)

pub mod logging;
pub mod metrics;
