//! HTTP middleware owned by the server.
//!
//! Request ID and tracing layers come straight from tower-http and are
//! wired in `server.rs`; only CORS needs local glue.

pub mod cors;

pub use cors::CorsPolicy;
