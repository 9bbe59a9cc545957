//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! bind (listener.rs, bounded by the startup grace window)
//!     → accept loop (connection cap, accept error back-off)
//!     → connection.rs (tracking, ids, gauges)
//!     → hyper auto connection serving the assembled axum Router
//!
//! Stop request:
//!     stop accepting → graceful drain (keep-alive off) → force close at deadline
//! ```
//!
//! # Design Decisions
//! - Binding is split from serving so bind failures surface synchronously
//! - Each connection is tracked for graceful shutdown
//! - Connection tasks live in a JoinSet so they can be aborted at the deadline

use std::fmt;

pub mod connection;
pub mod listener;

pub use listener::{Listener, ServingListener};

/// Which of the two listeners an event or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Dedicated health probe listener.
    Probe,
    /// Application traffic listener.
    Application,
}

impl ListenerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Probe => "probe",
            ListenerKind::Application => "application",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
