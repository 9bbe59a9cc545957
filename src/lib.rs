//! wess: HTTP service bootstrap library
//!
//! Runs an axum application behind an optional dedicated health probe
//! listener, with ordered startup, readiness tracking and a graceful,
//! deadline-bounded shutdown.

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{load_config, ServerConfig};
pub use error::ServerError;
pub use health::{Phase, Readiness};
pub use http::{ProbeMode, Server, WebSocketContext};
pub use lifecycle::{ShutdownHandle, StopHandle};
pub use net::ListenerKind;
