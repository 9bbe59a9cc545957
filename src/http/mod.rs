//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection (net/)
//!     → CORS (middleware/cors.rs, outermost when enabled)
//!     → request.rs (set and propagate x-request-id)
//!     → write timeout → TraceLayer
//!     → registered routes, websocket.rs upgrades, frontend.rs files
//!     → response.rs (404 / 405 when nothing matched)
//! ```
//!
//! # Design Decisions
//! - `server.rs` owns registration and assembles everything at start
//! - Probe routes live in `health/` and are nested or served separately

pub mod frontend;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use frontend::Frontend;
pub use middleware::CorsPolicy;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::{METHOD_NOT_ALLOWED_BODY, NOT_FOUND_BODY};
pub use server::{ProbeMode, RouteEntry, RouteKind, Server};
pub use websocket::{OriginPolicy, OriginRejection, WebSocketContext};
