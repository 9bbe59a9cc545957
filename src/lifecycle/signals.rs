//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGTERM and SIGINT handlers (Ctrl+C on Windows)
//! - Resolve once the first termination signal arrives
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered synchronously, before `start` returns, so an
//!   early signal is queued instead of taking the default action
//! - A handler that cannot be registered is logged and never fires;
//!   programmatic stop keeps working

use tracing::{error, info};

/// Termination signal handlers, registered at construction.
#[derive(Debug)]
pub struct Signals {
    #[cfg(unix)]
    sigterm: Option<tokio::signal::unix::Signal>,
    #[cfg(unix)]
    sigint: Option<tokio::signal::unix::Signal>,
    #[cfg(windows)]
    ctrl_c: Option<tokio::signal::windows::CtrlC>,
}

impl Signals {
    /// Register SIGTERM and SIGINT. Must be called from within a Tokio runtime.
    #[cfg(unix)]
    pub fn register() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate())
            .inspect_err(|e| error!(error = %e, "Failed to register SIGTERM handler"))
            .ok();
        let sigint = signal(SignalKind::interrupt())
            .inspect_err(|e| error!(error = %e, "Failed to register SIGINT handler"))
            .ok();

        Self { sigterm, sigint }
    }

    /// Register Ctrl+C. Must be called from within a Tokio runtime.
    #[cfg(windows)]
    pub fn register() -> Self {
        let ctrl_c = tokio::signal::windows::ctrl_c()
            .inspect_err(|e| error!(error = %e, "Failed to register Ctrl+C handler"))
            .ok();
        Self { ctrl_c }
    }

    /// Wait for SIGTERM or SIGINT and return the signal name.
    #[cfg(unix)]
    pub async fn wait(&mut self) -> &'static str {
        tokio::select! {
            Some(_) = recv(self.sigterm.as_mut()) => {
                info!("Received SIGTERM");
                "SIGTERM"
            }
            Some(_) = recv(self.sigint.as_mut()) => {
                info!("Received SIGINT");
                "SIGINT"
            }
            else => std::future::pending().await,
        }
    }

    /// Wait for Ctrl+C and return the signal name.
    #[cfg(windows)]
    pub async fn wait(&mut self) -> &'static str {
        match self.ctrl_c.as_mut() {
            Some(ctrl_c) if ctrl_c.recv().await.is_some() => {
                info!("Received Ctrl+C");
                "CTRL_C"
            }
            _ => std::future::pending().await,
        }
    }
}

#[cfg(unix)]
async fn recv(signal: Option<&mut tokio::signal::unix::Signal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => None,
    }
}
