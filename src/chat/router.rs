//! Conversation routing: canonical pairing keys and per-conversation
//! subscriber sets.
//!
//! A conversation between two users is identified by the pair sorted
//! ascending, so both participants resolve to the same key no matter who
//! opened it. Connections subscribe to a pairing when the client has that
//! conversation on screen; subscribers get the in-conversation events
//! (messages, typing, read receipts) while unsubscribed connections of the
//! same user still get notification-level events.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::ws::ConnectionHandle;

/// Order-independent identifier for the conversation between two users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairingKey {
    lower: i64,
    upper: i64,
}

impl PairingKey {
    pub fn new(a: i64, b: i64) -> Self {
        if a <= b {
            Self { lower: a, upper: b }
        } else {
            Self { lower: b, upper: a }
        }
    }

    /// The two participants, ascending.
    pub fn users(&self) -> (i64, i64) {
        (self.lower, self.upper)
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.lower == user_id || self.upper == user_id
    }
}

impl fmt::Display for PairingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.lower, self.upper)
    }
}

/// Pairing key -> connections currently subscribed to that conversation.
#[derive(Clone, Default)]
pub struct ConversationRouter {
    inner: Arc<DashMap<PairingKey, Vec<ConnectionHandle>>>,
}

impl ConversationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a pairing. Idempotent per connection id:
    /// re-opening the same conversation does not double-deliver.
    pub fn subscribe(&self, pairing: PairingKey, conn: &ConnectionHandle) {
        let mut subscribers = self.inner.entry(pairing).or_default();
        if !subscribers.iter().any(|c| c.id == conn.id) {
            subscribers.push(conn.clone());
        }
        tracing::debug!(
            pairing = %pairing,
            connection_id = conn.id,
            subscribers = subscribers.len(),
            "Conversation subscribed"
        );
    }

    /// Remove a connection from a pairing. Emptied pairings are dropped
    /// from the map entirely so idle conversations hold no memory.
    pub fn unsubscribe(&self, pairing: PairingKey, connection_id: u64) {
        if let Entry::Occupied(mut occupied) = self.inner.entry(pairing) {
            occupied.get_mut().retain(|c| c.id != connection_id);
            if occupied.get().is_empty() {
                occupied.remove();
            }
        }
    }

    /// Cloned subscriber snapshot for fan-out.
    pub fn subscribers_of(&self, pairing: PairingKey) -> Vec<ConnectionHandle> {
        self.inner
            .get(&pairing)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Disconnect cleanup: remove the connection from every pairing it had
    /// joined. The caller passes the join set the connection accumulated.
    pub fn drop_connection(&self, connection_id: u64, joined: &HashSet<PairingKey>) {
        for pairing in joined {
            self.unsubscribe(*pairing, connection_id);
        }
    }

    #[cfg(test)]
    fn pairing_count(&self) -> usize {
        self.inner.len()
    }
}
