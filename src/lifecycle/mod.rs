//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     probe bind (if separate) → application bind → caller marks ready
//!
//! Shutdown (shutdown.rs):
//!     signal or StopHandle::stop → readiness NotReady
//!     → drain probe → drain application → one result on ShutdownHandle
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop trigger
//! ```
//!
//! # Design Decisions
//! - Ordered startup: probe first, application second
//! - Ordered shutdown: readiness first, then probe, then application
//! - Shutdown has one deadline shared by both listeners

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{ShutdownHandle, StopHandle, StopReason};
