//! Presence transitions and typing indicators.
//!
//! Presence truth lives in the session registry; this module turns its
//! first-connection / last-connection edges into broadcasts. A persisted
//! is_online flag is updated alongside as an advisory snapshot for REST
//! reads — best effort, never blocking or failing a transition.
//!
//! Typing state is pure signaling: scoped to the other participant's
//! subscribed connections, last-write-wins, nothing stored.

use crate::chat::router::PairingKey;
use crate::state::AppState;
use crate::ws::protocol::ServerEvent;
use crate::ws::{broadcast, ConnectionHandle};

/// Announce a user coming online to every connected client.
/// Called only on the user's first connection.
pub fn broadcast_online(state: &AppState, user_id: i64) {
    tracing::info!(user_id, "User came online");
    broadcast::broadcast_to_all(&state.sessions, &ServerEvent::UserOnline { user_id });
    persist_online_flag(state, user_id, true);
}

/// Announce a user going offline to every connected client.
/// Called only when the user's last connection is gone.
pub fn broadcast_offline(state: &AppState, user_id: i64) {
    tracing::info!(user_id, "User went offline");
    broadcast::broadcast_to_all(&state.sessions, &ServerEvent::UserOffline { user_id });
    persist_online_flag(state, user_id, false);
}

fn persist_online_flag(state: &AppState, user_id: i64, online: bool) {
    let store = state.store.clone();
    tokio::spawn(async move {
        if let Err(err) = store.set_user_online_status(user_id, online).await {
            tracing::warn!(user_id, online, error = %err, "Failed to persist online flag");
        }
    });
}

/// Relay a typing transition to the other participant's connections that
/// are subscribed to this conversation. The sender's own devices are never
/// told, and neither is anyone outside the pairing.
pub fn relay_typing(state: &AppState, conn: &ConnectionHandle, receiver_id: i64, typing: bool) {
    let pairing = PairingKey::new(conn.user_id(), receiver_id);
    let event = ServerEvent::UserTyping {
        user_id: conn.user_id(),
        username: conn.username().to_string(),
        typing,
    };
    broadcast::send_to_pairing_user(&state.conversations, pairing, receiver_id, &event);
}
