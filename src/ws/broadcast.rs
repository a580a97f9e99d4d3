//! Fan-out helpers over the session registry and conversation router.
//!
//! Every send is per-target isolated: pushing into a closed channel just
//! drops that one delivery, it never fails the operation or skips the
//! remaining targets. Events are serialized once per fan-out.

use axum::extract::ws::Message;

use super::protocol::ServerEvent;
use super::registry::SessionRegistry;
use super::ConnectionHandle;
use crate::chat::router::{ConversationRouter, PairingKey};

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize server event");
            None
        }
    }
}

/// Send an event to a single connection.
pub fn send_to_connection(conn: &ConnectionHandle, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let _ = conn.sender.send(msg);
    }
}

fn send_to_connections(connections: &[ConnectionHandle], event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    for conn in connections {
        let _ = conn.sender.send(msg.clone());
    }
}

/// Send an event to every connection of one user, subscribed or not.
pub fn send_to_user(registry: &SessionRegistry, user_id: i64, event: &ServerEvent) {
    send_to_connections(&registry.connections_for(user_id), event);
}

/// Broadcast an event to every connection of every online user.
pub fn broadcast_to_all(registry: &SessionRegistry, event: &ServerEvent) {
    send_to_connections(&registry.all_connections(), event);
}

/// Send an event to every connection subscribed to a conversation pairing.
pub fn send_to_pairing(router: &ConversationRouter, pairing: PairingKey, event: &ServerEvent) {
    send_to_connections(&router.subscribers_of(pairing), event);
}

/// Send an event to the subscribed connections belonging to one participant
/// of a pairing. Used where an event is scoped to the *other* side of a
/// conversation, like typing indicators and read receipts.
pub fn send_to_pairing_user(
    router: &ConversationRouter,
    pairing: PairingKey,
    user_id: i64,
    event: &ServerEvent,
) {
    let subscribers: Vec<ConnectionHandle> = router
        .subscribers_of(pairing)
        .into_iter()
        .filter(|c| c.user_id() == user_id)
        .collect();
    send_to_connections(&subscribers, event);
}
