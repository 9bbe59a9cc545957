//! Shutdown coordination.
//!
//! # Responsibilities
//! - Own the single stop trigger fed by OS signals and `StopHandle::stop`
//! - Drop readiness before anything else is torn down
//! - Drain the probe listener, then the application listener, under one deadline
//! - Deliver exactly one completion value through `ShutdownHandle`

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::ServerError;
use crate::health::state::{LifecycleState, Phase, Readiness};
use crate::lifecycle::signals::Signals;
use crate::lifecycle::startup::RunningListeners;
use crate::observability::metrics;

/// What triggered the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal(&'static str),
    Requested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Signal(name) => write!(f, "signal {}", name),
            StopReason::Requested => f.write_str("stop requested"),
        }
    }
}

/// Requests a graceful shutdown. Cloneable; every call after the first is ignored.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::Sender<StopReason>,
}

impl StopHandle {
    /// Ask the server to shut down. Never blocks and never panics.
    pub fn stop(&self) {
        match self.tx.try_send(StopReason::Requested) {
            Ok(()) => tracing::debug!("Stop requested"),
            Err(TrySendError::Full(_)) => tracing::debug!("Stop already pending"),
            Err(TrySendError::Closed(_)) => tracing::debug!("Server already shutting down"),
        }
    }
}

/// Resolves once, with the outcome of the shutdown sequence.
#[derive(Debug)]
pub struct ShutdownHandle {
    rx: oneshot::Receiver<Result<(), ServerError>>,
}

impl Future for ShutdownHandle {
    type Output = Result<(), ServerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ServerError::CoordinatorLost)))
    }
}

/// Background task that turns the first stop trigger into an ordered shutdown.
pub(crate) struct Coordinator {
    pub lifecycle: Arc<LifecycleState>,
    pub listeners: RunningListeners,
    pub timeout: Duration,
    pub handle_signals: bool,
}

impl Coordinator {
    /// Start the coordinator task. Signal handlers are in place when this returns.
    pub fn spawn(self) -> (ShutdownHandle, StopHandle) {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();
        let signals = self.handle_signals.then(Signals::register);

        tokio::spawn(async move {
            let result = self.run(stop_rx, signals).await;
            // The caller may have dropped its handle.
            let _ = done_tx.send(result);
        });

        (ShutdownHandle { rx: done_rx }, StopHandle { tx: stop_tx })
    }

    async fn run(
        self,
        mut stop_rx: mpsc::Receiver<StopReason>,
        mut signals: Option<Signals>,
    ) -> Result<(), ServerError> {
        let Coordinator {
            lifecycle,
            listeners,
            timeout,
            ..
        } = self;

        let reason = tokio::select! {
            Some(reason) = stop_rx.recv() => reason,
            Some(signal) = wait_for_signal(signals.as_mut()) => StopReason::Signal(signal),
            else => {
                tracing::debug!("No stop producer left, serving until the process exits");
                std::future::pending().await
            }
        };
        stop_rx.close();

        let started = Instant::now();
        tracing::info!(reason = %reason, timeout = ?timeout, "Shutting down");

        lifecycle.set_readiness(Readiness::NotReady);
        lifecycle.set_phase(Phase::Draining);

        let deadline = started + timeout;

        if let Some(probe) = listeners.probe {
            if let Err(err) = probe.shutdown(deadline, timeout).await {
                tracing::error!(error = %err, "Probe listener shutdown failed");
            }
        }

        let result = listeners.app.shutdown(deadline, timeout).await;
        match &result {
            Ok(()) => tracing::info!(elapsed = ?started.elapsed(), "Server stopped"),
            Err(err) => tracing::error!(error = %err, "Application listener shutdown failed"),
        }

        lifecycle.set_phase(Phase::Stopped);
        metrics::record_shutdown(started.elapsed(), result.is_ok());
        result
    }
}

async fn wait_for_signal(signals: Option<&mut Signals>) -> Option<&'static str> {
    match signals {
        Some(signals) => Some(signals.wait().await),
        None => None,
    }
}
