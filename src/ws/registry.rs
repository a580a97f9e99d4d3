//! Session registry: which users currently hold live connections.
//!
//! A user may be connected from several devices at once. Presence
//! transitions fire only on the edges — first connection in, last
//! connection out — and both edge checks happen under the map's entry
//! guard so concurrent connects and disconnects of the same user can
//! never double-fire or skip a transition.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::ConnectionHandle;

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<DashMap<i64, Vec<ConnectionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns true when this is the user's first live
    /// connection — the caller owes exactly one "came online" broadcast.
    pub fn register(&self, conn: ConnectionHandle) -> bool {
        let user_id = conn.user_id();
        let mut connections = self.inner.entry(user_id).or_default();
        connections.push(conn);
        let first = connections.len() == 1;

        tracing::debug!(
            user_id,
            connections = connections.len(),
            "Connection registered"
        );
        first
    }

    /// Remove a connection by id. Returns true when the user's last
    /// connection went away — the caller owes exactly one "went offline"
    /// broadcast. Emptied entries are removed under the same guard, so no
    /// stale key can linger between the check and the removal.
    pub fn deregister(&self, user_id: i64, connection_id: u64) -> bool {
        let last = match self.inner.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().retain(|c| c.id != connection_id);
                if occupied.get().is_empty() {
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        tracing::debug!(user_id, connection_id, "Connection deregistered");
        last
    }

    /// A user is online exactly when they have at least one live connection.
    pub fn is_online(&self, user_id: i64) -> bool {
        self.inner
            .get(&user_id)
            .map(|c| !c.is_empty())
            .unwrap_or(false)
    }

    /// Cloned snapshot of one user's connections. Callers fan out against
    /// the snapshot, never while holding a map guard.
    pub fn connections_for(&self, user_id: i64) -> Vec<ConnectionHandle> {
        self.inner
            .get(&user_id)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Every live connection, for global broadcasts.
    pub fn all_connections(&self) -> Vec<ConnectionHandle> {
        self.inner
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Ids of every online user, sorted for stable output.
    pub fn online_user_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.inner.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}
