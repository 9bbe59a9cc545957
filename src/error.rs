//! Errors that cross the orchestrator boundary.
//!
//! Only configuration, startup and shutdown failures are reported to the
//! caller. Request-time failures (unknown route, wrong method, rejected
//! WebSocket origin) end at the HTTP response and never show up here.

use std::time::Duration;

use crate::net::ListenerKind;

/// Error type for server construction, startup and shutdown.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid wiring requested by the caller (bad frontend mount, unsupported method).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A listener could not be bound within the startup grace window.
    #[error("failed to start {listener} listener on {address}: {source}")]
    Startup {
        listener: ListenerKind,
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called on an instance that already ran.
    #[error("server was already started; instances cannot be restarted")]
    AlreadyStarted,

    /// Connections were still open when the shutdown deadline passed.
    #[error("{listener} listener did not drain within {timeout:?}, connections were force-closed")]
    ShutdownTimeout {
        listener: ListenerKind,
        timeout: Duration,
    },

    /// The listener task failed while shutting down.
    #[error("{listener} listener failed while shutting down: {source}")]
    Shutdown {
        listener: ListenerKind,
        #[source]
        source: std::io::Error,
    },

    /// The shutdown coordinator went away without reporting a result.
    #[error("shutdown coordinator exited without reporting a result")]
    CoordinatorLost,
}

impl ServerError {
    /// True for failures detected while binding listeners in `start`.
    pub fn is_startup(&self) -> bool {
        matches!(self, ServerError::Startup { .. })
    }

    /// True for failures surfaced on the shutdown completion handle.
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self,
            ServerError::ShutdownTimeout { .. }
                | ServerError::Shutdown { .. }
                | ServerError::CoordinatorLost
        )
    }
}
