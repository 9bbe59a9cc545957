//! Health probe subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle orchestrator
//!     → state.rs (readiness flag, lifecycle phase)
//!     → probes.rs (GET {root}/liveness, GET {root}/readiness)
//!     → probe listener, or nested into the application router
//! ```
//!
//! # Design Decisions
//! - Liveness and readiness answer from the same flag
//! - Successful probes are silent unless probe tracing is on
//! - Failed probes are always logged at warn

pub mod probes;
pub mod state;

pub use probes::health_router;
pub use state::{LifecycleState, Phase, Readiness};
