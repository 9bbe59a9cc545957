//! Server readiness and lifecycle phase.
//!
//! # States
//! - NotReady: probes answer 503
//! - Ready: probes answer 200
//!
//! # Phase Transitions
//! ```text
//! Created → Serving:  both listeners bound and serving
//! Serving → Draining: first stop trigger (readiness drops first)
//! Draining → Stopped: shutdown result delivered
//! ```
//!
//! # Design Decisions
//! - Plain atomics so probe handlers never block
//! - Owned by one server instance and shared by `Arc`, never global
//! - Only the lifecycle orchestrator writes; everyone else reads

use std::sync::atomic::{AtomicU8, Ordering};

use crate::observability::metrics;

/// Readiness as reported by the probe routes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady = 0,
    Ready = 1,
}

impl From<u8> for Readiness {
    fn from(val: u8) -> Self {
        match val {
            1 => Readiness::Ready,
            _ => Readiness::NotReady,
        }
    }
}

/// Coarse lifecycle phase of a server instance.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created = 0,
    Serving = 1,
    Draining = 2,
    Stopped = 3,
}

impl From<u8> for Phase {
    fn from(val: u8) -> Self {
        match val {
            1 => Phase::Serving,
            2 => Phase::Draining,
            3 => Phase::Stopped,
            _ => Phase::Created,
        }
    }
}

/// Readiness flag plus lifecycle phase.
#[derive(Debug)]
pub struct LifecycleState {
    readiness: AtomicU8,
    phase: AtomicU8,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self {
            readiness: AtomicU8::new(Readiness::NotReady as u8),
            phase: AtomicU8::new(Phase::Created as u8),
        }
    }

    pub fn readiness(&self) -> Readiness {
        Readiness::from(self.readiness.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    pub fn phase(&self) -> Phase {
        Phase::from(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_readiness(&self, readiness: Readiness) {
        let previous = Readiness::from(self.readiness.swap(readiness as u8, Ordering::AcqRel));
        if previous != readiness {
            tracing::info!(from = ?previous, to = ?readiness, "Readiness changed");
        }
        metrics::set_ready(readiness == Readiness::Ready);
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        let previous = Phase::from(self.phase.swap(phase as u8, Ordering::AcqRel));
        tracing::debug!(from = ?previous, to = ?phase, "Lifecycle phase changed");
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}
