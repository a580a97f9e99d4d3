//! Message pipeline: validate, persist once, then fan out.
//!
//! Every mutating operation runs through here, whether it arrived over a
//! WebSocket event or a REST call, so there is exactly one authoritative
//! persistence step per logical action and one fan-out decision per event
//! kind. Nothing is broadcast unless the write already succeeded.

use crate::auth::Identity;
use crate::chat::router::PairingKey;
use crate::db::models::{Message, MessageKind, NewMessage};
use crate::error::ChatError;
use crate::state::AppState;
use crate::ws::protocol::{SenderInfo, ServerEvent};
use crate::ws::{broadcast, ConnectionHandle};

/// Maximum message content length in characters.
pub const MAX_CONTENT_LENGTH: usize = 4000;

/// Submit a message: validate, persist, fan out.
///
/// Delivery tiers after the authoritative write:
/// - subscribers of the pairing get the full message,
/// - every connection of the receiver gets a notification (covers devices
///   without the conversation open),
/// - the originating connection alone gets a confirmation carrying the
///   persisted message, for reconciling optimistic client echoes.
///
/// The REST path has no originating connection and takes the HTTP response
/// as its confirmation instead.
pub async fn send_message(
    state: &AppState,
    sender: &Identity,
    originating: Option<&ConnectionHandle>,
    receiver_id: i64,
    content: String,
    message_type: MessageKind,
) -> Result<Message, ChatError> {
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(ChatError::Validation(
            "message content is required".to_string(),
        ));
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(ChatError::Validation(format!(
            "message content exceeds {MAX_CONTENT_LENGTH} characters"
        )));
    }
    if receiver_id == sender.user_id {
        return Err(ChatError::Validation(
            "cannot send a message to yourself".to_string(),
        ));
    }

    // Receiver existence is checked against storage, not the registry:
    // offline users receive messages too, they just read them later.
    if state.store.find_user_by_id(receiver_id).await?.is_none() {
        return Err(ChatError::NotFound(format!(
            "receiver {receiver_id} not found"
        )));
    }

    let message = state
        .store
        .create_message(NewMessage {
            sender_id: sender.user_id,
            receiver_id,
            content,
            message_type,
        })
        .await?;

    let pairing = PairingKey::new(sender.user_id, receiver_id);
    broadcast::send_to_pairing(
        &state.conversations,
        pairing,
        &ServerEvent::NewMessage(message.clone()),
    );
    broadcast::send_to_user(
        &state.sessions,
        receiver_id,
        &ServerEvent::MessageNotification {
            message: message.clone(),
            sender: SenderInfo {
                id: sender.user_id,
                username: sender.username.clone(),
            },
        },
    );
    if let Some(conn) = originating {
        broadcast::send_to_connection(
            conn,
            &ServerEvent::MessageSent {
                message: message.clone(),
            },
        );
    }

    tracing::debug!(
        message_id = message.id,
        sender_id = sender.user_id,
        receiver_id,
        "Message delivered"
    );
    Ok(message)
}

/// Delete a single message. Only its sender may do this; subscribers of the
/// conversation are told which id disappeared.
pub async fn delete_message(
    state: &AppState,
    requester: &Identity,
    message_id: i64,
) -> Result<(), ChatError> {
    let message = state
        .store
        .find_message_by_id(message_id)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("message {message_id} not found")))?;

    if message.sender_id != requester.user_id {
        return Err(ChatError::Forbidden(
            "only the sender can delete a message".to_string(),
        ));
    }

    state.store.delete_message_by_id(message_id).await?;

    let pairing = PairingKey::new(message.sender_id, message.receiver_id);
    broadcast::send_to_pairing(
        &state.conversations,
        pairing,
        &ServerEvent::MessageDeleted { message_id },
    );

    tracing::debug!(message_id, user_id = requester.user_id, "Message deleted");
    Ok(())
}

/// Delete every message between the requester and another user, both
/// directions. Returns the removed row count and tells the pairing's
/// subscribers the conversation was cleared.
pub async fn delete_conversation(
    state: &AppState,
    requester: &Identity,
    other_user_id: i64,
) -> Result<u64, ChatError> {
    let deleted_count = state
        .store
        .delete_conversation_messages(requester.user_id, other_user_id)
        .await?;

    let pairing = PairingKey::new(requester.user_id, other_user_id);
    let (user_id_1, user_id_2) = pairing.users();
    broadcast::send_to_pairing(
        &state.conversations,
        pairing,
        &ServerEvent::ConversationDeleted {
            user_id_1,
            user_id_2,
            deleted_count,
        },
    );

    tracing::debug!(
        user_id = requester.user_id,
        other_user_id,
        deleted_count,
        "Conversation deleted"
    );
    Ok(deleted_count)
}

/// Delete every message the requester has ever sent, across all
/// conversations. Returns the row count. No broadcast: this is a bulk
/// account operation, not a conversation event.
pub async fn delete_all_sent(state: &AppState, requester: &Identity) -> Result<u64, ChatError> {
    let deleted_count = state
        .store
        .delete_all_messages_by_sender(requester.user_id)
        .await?;
    tracing::info!(
        user_id = requester.user_id,
        deleted_count,
        "All sent messages deleted"
    );
    Ok(deleted_count)
}

/// Mark one message read. Only the receiver may do this; the sender's
/// subscribed connections get a read receipt.
pub async fn mark_message_read(
    state: &AppState,
    requester: &Identity,
    message_id: i64,
) -> Result<(), ChatError> {
    let message = state
        .store
        .find_message_by_id(message_id)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("message {message_id} not found")))?;

    if message.receiver_id != requester.user_id {
        return Err(ChatError::Forbidden(
            "only the receiver can mark a message as read".to_string(),
        ));
    }

    state.store.mark_message_read(message_id).await?;

    let pairing = PairingKey::new(message.sender_id, message.receiver_id);
    broadcast::send_to_pairing_user(
        &state.conversations,
        pairing,
        message.sender_id,
        &ServerEvent::MessageRead {
            message_id,
            reader_id: requester.user_id,
        },
    );
    Ok(())
}

/// Mark everything the other user sent to the requester as read, in one
/// statement. Returns how many rows flipped; the other participant's
/// subscribed connections get a conversation-level receipt.
pub async fn mark_conversation_read(
    state: &AppState,
    requester: &Identity,
    other_user_id: i64,
) -> Result<u64, ChatError> {
    let marked = state
        .store
        .mark_conversation_read(requester.user_id, other_user_id)
        .await?;

    let pairing = PairingKey::new(requester.user_id, other_user_id);
    broadcast::send_to_pairing_user(
        &state.conversations,
        pairing,
        other_user_id,
        &ServerEvent::ConversationRead {
            reader_id: requester.user_id,
            other_user_id,
        },
    );
    Ok(marked)
}
