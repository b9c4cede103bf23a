//! The set of live connections.
//!
//! Membership is guarded by one registry-wide `RwLock`, separate from every
//! connection's own record lock. Insert and remove take it exclusively; lookups
//! and scans take it shared. Scans that need to touch connection records go
//! through [`ConnectionRegistry::snapshot`], which releases the registry lock
//! before any record lock is taken.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::connection::record::{Connection, ConnectionId};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a connection id. Ids are never reused.
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn insert(&self, connection: Arc<Connection>) {
        let id = connection.id();
        let mut connections = self.connections.write();
        connections.insert(id, connection);
        debug!(conn_id = id, live = connections.len(), "Connection registered");
    }

    /// Removes a connection, returning it if it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write();
        let removed = connections.remove(&id);
        if removed.is_some() {
            debug!(conn_id = id, live = connections.len(), "Connection removed");
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(&id).cloned()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Ids of all live connections, in ascending order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.connections.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Clones out every live connection, ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut all: Vec<_> = self.connections.read().values().cloned().collect();
        all.sort_unstable_by_key(|c| c.id());
        all
    }

    /// Runs `f` on each connection while holding the registry lock.
    ///
    /// `f` must not take connection record locks or touch the registry; use
    /// [`snapshot`](Self::snapshot) for that.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Connection>),
    {
        for connection in self.connections.read().values() {
            f(connection);
        }
    }

    /// Removes every connection and returns them.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.connections.write().drain().map(|(_, c)| c).collect()
    }
}
