//! REST endpoints for direct messages: send, history, sidebar summaries,
//! read state, and deletion.
//!
//! Handlers are thin wrappers: auth comes from the CurrentUser extractor,
//! mutations go through the pipeline (same path as WebSocket events, same
//! broadcasts), reads go straight to the store.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::CurrentUser;
use crate::chat::pipeline;
use crate::db::models::{ConversationSummary, Message, MessageKind};
use crate::error::ChatError;
use crate::state::AppState;

/// Default page size for conversation history.
const DEFAULT_LIMIT: u32 = 50;
/// Maximum page size for conversation history.
const MAX_LIMIT: u32 = 100;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: i64,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageKind,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedReadResponse {
    pub marked_read: u64,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted_count: u64,
}

// --- Handlers ---

/// POST /api/messages
/// Send a direct message via REST. Runs the same pipeline as the WebSocket
/// path, so subscribers and the receiver's devices are notified either way;
/// the HTTP response body is the confirmation.
pub async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ChatError> {
    let message = pipeline::send_message(
        &state,
        &user,
        None,
        body.receiver_id,
        body.content,
        body.message_type,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/conversation/{user_id}?limit=50
/// Chronological message history between the caller and another user.
pub async fn conversation_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(other_user_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ChatError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let messages = state
        .store
        .conversation_between(user.user_id, other_user_id, limit)
        .await?;
    let count = messages.len();
    Ok(Json(HistoryResponse { messages, count }))
}

/// GET /api/messages/conversations
/// Sidebar rows: every user the caller has exchanged messages with, latest
/// conversation first, with unread counts.
pub async fn recent_conversations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ConversationsResponse>, ChatError> {
    let conversations = state
        .store
        .list_recent_conversation_summaries(user.user_id)
        .await?;
    Ok(Json(ConversationsResponse { conversations }))
}

/// GET /api/messages/unread-count
/// Total unread messages addressed to the caller.
pub async fn unread_count(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UnreadCountResponse>, ChatError> {
    let unread_count = state.store.count_unread_for_user(user.user_id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

/// PUT /api/messages/read/{message_id}
/// Mark a single message read. Receiver only.
pub async fn mark_message_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(message_id): Path<i64>,
) -> Result<StatusCode, ChatError> {
    pipeline::mark_message_read(&state, &user, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/messages/conversation/{user_id}/read
/// Mark every message from the other user as read in one statement.
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(other_user_id): Path<i64>,
) -> Result<Json<MarkedReadResponse>, ChatError> {
    let marked_read = pipeline::mark_conversation_read(&state, &user, other_user_id).await?;
    Ok(Json(MarkedReadResponse { marked_read }))
}

/// DELETE /api/messages/{message_id}
/// Delete one message. Sender only.
pub async fn delete_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(message_id): Path<i64>,
) -> Result<StatusCode, ChatError> {
    pipeline::delete_message(&state, &user, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/messages/conversation/{user_id}
/// Delete the whole conversation with another user, both directions.
pub async fn delete_conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(other_user_id): Path<i64>,
) -> Result<Json<DeletedResponse>, ChatError> {
    let deleted_count = pipeline::delete_conversation(&state, &user, other_user_id).await?;
    Ok(Json(DeletedResponse { deleted_count }))
}

/// DELETE /api/messages/user/all
/// Delete every message the caller has ever sent.
pub async fn delete_all_sent(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<DeletedResponse>, ChatError> {
    let deleted_count = pipeline::delete_all_sent(&state, &user).await?;
    Ok(Json(DeletedResponse { deleted_count }))
}
