pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::auth::Identity;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push frames to a specific
/// client; the connection's writer task drains it into the socket.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Process-wide connection id counter. Ids are never reused, so a stale
/// handle can always be told apart from a reconnect.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// One live authenticated connection: transport handle plus the identity
/// established at handshake. Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: u64,
    pub identity: Identity,
    pub sender: ConnectionSender,
}

impl ConnectionHandle {
    pub fn user_id(&self) -> i64 {
        self.identity.user_id
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }
}
