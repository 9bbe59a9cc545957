//! Liveness and readiness probe routes.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::health::state::LifecycleState;
use crate::observability::metrics;

#[derive(Clone)]
struct ProbeState {
    lifecycle: Arc<LifecycleState>,
    trace: bool,
}

impl ProbeState {
    fn answer(&self, probe: &'static str) -> StatusCode {
        let status = if self.lifecycle.is_ready() {
            if self.trace {
                tracing::info!(probe, "Server is ready");
            }
            StatusCode::OK
        } else {
            tracing::warn!(probe, phase = ?self.lifecycle.phase(), "Server not ready");
            StatusCode::SERVICE_UNAVAILABLE
        };
        metrics::record_probe(probe, status.as_u16());
        status
    }
}

/// Router with `GET /liveness` and `GET /readiness`, meant to be nested
/// under the health root.
///
/// Both answer 200 while ready and 503 otherwise, with an empty body.
/// HTTP request tracing is only attached when `trace` is set.
pub fn health_router(lifecycle: Arc<LifecycleState>, trace: bool) -> Router {
    let router = Router::new()
        .route("/liveness", get(liveness))
        .route("/readiness", get(readiness))
        .with_state(ProbeState { lifecycle, trace });

    if trace {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

async fn liveness(State(probe): State<ProbeState>) -> StatusCode {
    probe.answer("liveness")
}

async fn readiness(State(probe): State<ProbeState>) -> StatusCode {
    probe.answer("readiness")
}
