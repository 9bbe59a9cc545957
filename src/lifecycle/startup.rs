//! Startup sequencing.
//!
//! # Responsibilities
//! - Bind the probe listener first (when separate), then the application listener
//! - Surface bind failures synchronously as `ServerError::Startup`
//! - Release an already serving probe listener when the application bind fails
//!
//! # Design Decisions
//! - Fail fast: the first bind error aborts startup
//! - Readiness is left to the caller; nothing here marks the server ready

use axum::Router;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::net::{Listener, ListenerKind, ServingListener};
use crate::observability::metrics;

/// Listeners running after a successful startup.
#[derive(Debug)]
pub struct RunningListeners {
    pub probe: Option<ServingListener>,
    pub app: ServingListener,
}

/// Bind and serve the listeners in order.
///
/// `probe` carries the router for a dedicated probe listener, if any.
pub async fn start_listeners(
    config: &ServerConfig,
    probe: Option<Router>,
    app: Router,
) -> Result<RunningListeners, ServerError> {
    let grace = config.startup_grace();
    let tuning = &config.listener;

    let probe = match probe {
        Some(router) => {
            let listener = bind(config, ListenerKind::Probe, config.probe_port).await?;
            Some(listener.serve(router, tuning))
        }
        None => None,
    };

    let app_listener = match bind(config, ListenerKind::Application, config.port).await {
        Ok(listener) => listener,
        Err(err) => {
            if let Some(probe) = probe {
                tracing::info!(address = %probe.local_addr(), "Releasing probe listener after failed startup");
                if let Err(cleanup) = probe.shutdown(Instant::now() + grace, grace).await {
                    tracing::warn!(error = %cleanup, "Probe listener did not stop cleanly");
                }
            }
            return Err(err);
        }
    };

    Ok(RunningListeners {
        probe,
        app: app_listener.serve(app, tuning),
    })
}

async fn bind(config: &ServerConfig, kind: ListenerKind, port: u16) -> Result<Listener, ServerError> {
    Listener::bind(
        kind,
        &config.address,
        port,
        config.startup_grace(),
        config.listener.max_connections(),
    )
    .await
    .inspect_err(|err| {
        metrics::record_startup_failure(kind);
        tracing::error!(listener = %kind, error = %err, "Listener failed to start");
    })
}
