pub mod migrations;
pub mod models;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use models::{ConversationSummary, Message, NewMessage, User};

/// Failures surfaced by a store implementation. Callers treat these as
/// opaque persistence errors; details stay in the logs.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("database lock poisoned")]
    LockPoisoned,
}

/// Persistence collaborator for the realtime core. The engine calls this
/// for every durable effect and never writes through any other path, so a
/// message is persisted exactly once no matter which surface submitted it.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a message and return the stored row, id and timestamp assigned.
    async fn create_message(&self, new: NewMessage) -> Result<Message, StoreError>;

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError>;

    async fn find_message_by_id(&self, message_id: i64) -> Result<Option<Message>, StoreError>;

    /// Returns true if a row was actually deleted.
    async fn delete_message_by_id(&self, message_id: i64) -> Result<bool, StoreError>;

    /// Delete every message between the two users, in both directions.
    /// Returns the number of rows removed.
    async fn delete_conversation_messages(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<u64, StoreError>;

    /// Delete every message the user has ever sent. Returns the row count.
    async fn delete_all_messages_by_sender(&self, sender_id: i64) -> Result<u64, StoreError>;

    async fn mark_message_read(&self, message_id: i64) -> Result<(), StoreError>;

    /// Mark all messages from `other_user_id` to `reader_id` as read in one
    /// statement. Returns how many rows flipped.
    async fn mark_conversation_read(
        &self,
        reader_id: i64,
        other_user_id: i64,
    ) -> Result<u64, StoreError>;

    /// Messages between the two users in chronological order, capped at
    /// `limit` most recent.
    async fn conversation_between(
        &self,
        user_a: i64,
        user_b: i64,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError>;

    /// Sidebar rows for every user the caller has exchanged messages with,
    /// most recent conversation first.
    async fn list_recent_conversation_summaries(
        &self,
        user_id: i64,
    ) -> Result<Vec<ConversationSummary>, StoreError>;

    /// Total unread messages addressed to the user, across all conversations.
    async fn count_unread_for_user(&self, user_id: i64) -> Result<i64, StoreError>;

    /// Advisory presence flag for REST reads. Best effort; the registry is
    /// authoritative for live presence.
    async fn set_user_online_status(&self, user_id: i64, online: bool) -> Result<(), StoreError>;

    /// All users, optionally excluding one (the caller, usually).
    async fn list_users(&self, exclude_user_id: Option<i64>) -> Result<Vec<User>, StoreError>;
}

/// Shared handle to the persistence collaborator.
pub type DynStore = Arc<dyn MessageStore>;
