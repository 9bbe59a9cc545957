//! Connection lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count open connections per listener
//! - Keep the `wess_connections_active` gauge in step with the count

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::net::ListenerKind;
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks open connections on one listener.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    kind: ListenerKind,
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new(kind: ListenerKind) -> Self {
        Self {
            kind,
            active_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a new connection. Returns a guard that decrements on drop.
    pub fn track(&self, peer: SocketAddr) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::connection_opened(self.kind);

        let id = ConnectionId::new();
        tracing::trace!(connection_id = %id, peer_addr = %peer, listener = %self.kind, "Connection opened");

        ConnectionGuard {
            kind: self.kind,
            active_count: Arc::clone(&self.active_count),
            id,
        }
    }

    /// Current number of open connections.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements the active count when dropped, including on abort.
#[derive(Debug)]
pub struct ConnectionGuard {
    kind: ListenerKind,
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::connection_closed(self.kind);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
