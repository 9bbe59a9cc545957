//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            environment
//!     → loader.rs (parse)   ←── PORT, PROBE_PORT, TRACE_PROBE,
//!                               WEBSOCKET_ALLOWED_ORIGINS
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → Server::new (defaults applied, probe mode resolved)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a server is constructed
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{config_from_env, load_config, ConfigError};
pub use schema::{CorsConfig, ListenerTuning, ServerConfig, WebSocketConfig};
pub use validation::{validate_config, ValidationError};
