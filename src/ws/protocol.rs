//! Wire protocol: JSON text frames of the form `{"event": ..., "data": ...}`,
//! plus the per-event dispatcher.
//!
//! Handler failures are isolated per event: a failed event sends one error
//! frame back to the originating connection and the reader loop keeps
//! going. Only transport errors end a connection.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::chat::router::PairingKey;
use crate::chat::{pipeline, presence};
use crate::db::models::{Message, MessageKind};
use crate::error::ChatError;
use crate::state::AppState;
use crate::ws::{broadcast, ConnectionHandle};

/// Events a client may submit over an established connection.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinConversation {
        other_user_id: i64,
    },
    LeaveConversation {
        other_user_id: i64,
    },
    SendMessage {
        receiver_id: i64,
        content: String,
        #[serde(default)]
        message_type: MessageKind,
    },
    TypingStart {
        receiver_id: i64,
    },
    TypingStop {
        receiver_id: i64,
    },
    MarkMessageRead {
        message_id: i64,
    },
    MarkConversationRead {
        other_user_id: i64,
    },
    DeleteMessage {
        message_id: i64,
    },
    DeleteConversation {
        other_user_id: i64,
    },
}

impl ClientEvent {
    /// Event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinConversation { .. } => "join_conversation",
            ClientEvent::LeaveConversation { .. } => "leave_conversation",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::TypingStart { .. } => "typing_start",
            ClientEvent::TypingStop { .. } => "typing_stop",
            ClientEvent::MarkMessageRead { .. } => "mark_message_read",
            ClientEvent::MarkConversationRead { .. } => "mark_conversation_read",
            ClientEvent::DeleteMessage { .. } => "delete_message",
            ClientEvent::DeleteConversation { .. } => "delete_conversation",
        }
    }
}

/// Sender summary carried on notification events, so a client can render
/// a toast without a user lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: i64,
    pub username: String,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full delivery to connections subscribed to the conversation.
    NewMessage(Message),
    /// Notification to every connection of the receiver, subscribed or not.
    MessageNotification { message: Message, sender: SenderInfo },
    /// Confirmation to the originating connection only, carrying the
    /// persisted message so the client can reconcile an optimistic echo.
    MessageSent { message: Message },
    MessageRead { message_id: i64, reader_id: i64 },
    ConversationRead { reader_id: i64, other_user_id: i64 },
    MessageDeleted { message_id: i64 },
    ConversationDeleted {
        user_id_1: i64,
        user_id_2: i64,
        deleted_count: u64,
    },
    UserTyping {
        user_id: i64,
        username: String,
        typing: bool,
    },
    UserOnline { user_id: i64 },
    UserOffline { user_id: i64 },
    /// Snapshot of everyone currently online, sent once per new connection.
    OnlineUsers { user_ids: Vec<i64> },
    Error { message: String },
}

/// Handle one inbound text frame: parse, dispatch, and on failure report
/// back to the submitting connection only.
pub async fn handle_text_frame(
    text: &str,
    conn: &ConnectionHandle,
    joined: &mut HashSet<PairingKey>,
    state: &AppState,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(
                user_id = conn.user_id(),
                connection_id = conn.id,
                error = %err,
                "Malformed client event"
            );
            broadcast::send_to_connection(
                conn,
                &ServerEvent::Error {
                    message: "malformed event".to_string(),
                },
            );
            return;
        }
    };

    let name = event.name();
    if let Err(err) = dispatch_event(event, conn, joined, state).await {
        tracing::warn!(
            user_id = conn.user_id(),
            connection_id = conn.id,
            event = name,
            error = %err,
            "Client event failed"
        );
        broadcast::send_to_connection(
            conn,
            &ServerEvent::Error {
                message: err.client_message(),
            },
        );
    }
}

async fn dispatch_event(
    event: ClientEvent,
    conn: &ConnectionHandle,
    joined: &mut HashSet<PairingKey>,
    state: &AppState,
) -> Result<(), ChatError> {
    match event {
        ClientEvent::JoinConversation { other_user_id } => {
            let pairing = PairingKey::new(conn.user_id(), other_user_id);
            state.conversations.subscribe(pairing, conn);
            joined.insert(pairing);
            Ok(())
        }
        ClientEvent::LeaveConversation { other_user_id } => {
            let pairing = PairingKey::new(conn.user_id(), other_user_id);
            state.conversations.unsubscribe(pairing, conn.id);
            joined.remove(&pairing);
            Ok(())
        }
        ClientEvent::SendMessage {
            receiver_id,
            content,
            message_type,
        } => pipeline::send_message(
            state,
            &conn.identity,
            Some(conn),
            receiver_id,
            content,
            message_type,
        )
        .await
        .map(|_| ()),
        ClientEvent::TypingStart { receiver_id } => {
            presence::relay_typing(state, conn, receiver_id, true);
            Ok(())
        }
        ClientEvent::TypingStop { receiver_id } => {
            presence::relay_typing(state, conn, receiver_id, false);
            Ok(())
        }
        ClientEvent::MarkMessageRead { message_id } => {
            pipeline::mark_message_read(state, &conn.identity, message_id).await
        }
        ClientEvent::MarkConversationRead { other_user_id } => {
            pipeline::mark_conversation_read(state, &conn.identity, other_user_id)
                .await
                .map(|_| ())
        }
        ClientEvent::DeleteMessage { message_id } => {
            pipeline::delete_message(state, &conn.identity, message_id).await
        }
        ClientEvent::DeleteConversation { other_user_id } => {
            pipeline::delete_conversation(state, &conn.identity, other_user_id)
                .await
                .map(|_| ())
        }
    }
}
