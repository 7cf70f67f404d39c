//! Bookkeeping for in-flight sessions.
//!
//! The registry exists for observability and drain support: the accept loop
//! registers each session before spawning it and the session task removes
//! itself when it finishes. It imposes no behavior on the sessions. The
//! single mutex is held only for the mutation; no I/O happens under it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Identifier for a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// A live-session entry.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Client address of the session.
    pub peer_addr: SocketAddr,
    /// When the session was registered.
    pub started_at: Instant,
}

/// Tracks the set of in-flight sessions under a single lock.
///
/// Removal races with completion only ever shrink the set: insertion and
/// removal are the only mutation paths, both under the same lock.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<u64, SessionEntry>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, SessionEntry>> {
        // Mutations are single-step inserts/removes, so the map is intact
        // even if a holder panicked.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session, returning its id for later removal.
    pub fn register(&self, peer_addr: SocketAddr) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = SessionEntry {
            peer_addr,
            started_at: Instant::now(),
        };
        self.lock().insert(id, entry);
        SessionId(id)
    }

    /// Remove a finished session. Removing an id twice is a no-op.
    pub fn unregister(&self, id: SessionId) {
        self.lock().remove(&id.0);
    }

    /// Number of sessions currently in flight.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the peer addresses of live sessions.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.lock().values().map(|e| e.peer_addr).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_unregister() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());

        let a = registry.register(addr(1000));
        let b = registry.register(addr(1001));
        assert_eq!(registry.len(), 2);

        registry.unregister(a);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.peers(), vec![addr(1001)]);

        registry.unregister(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_twice_is_noop() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(addr(1000));
        registry.unregister(id);
        registry.unregister(id);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(addr(1000));
        let b = registry.register(addr(1000));
        assert_ne!(a, b);
    }
}
