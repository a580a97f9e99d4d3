//! SQLite-backed message store.
//!
//! rusqlite is synchronous — the connection sits behind an Arc<Mutex> and
//! every operation runs on the blocking thread pool via
//! tokio::task::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{ConversationSummary, Message, MessageKind, NewMessage, User};
use super::{migrations, MessageStore, StoreError};

/// Shared database connection handle.
pub type DbPool = Arc<Mutex<Connection>>;

const USER_SELECT: &str =
    "SELECT id, username, email, avatar, is_online, last_seen, created_at FROM users";

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, m.receiver_id, m.content, \
     m.message_type, m.is_read, m.created_at, \
     s.username AS sender_username, r.username AS receiver_username \
     FROM messages m \
     JOIN users s ON s.id = m.sender_id \
     JOIN users r ON r.id = m.receiver_id";

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    /// Open (or create) the database under `data_dir`, enable WAL mode and
    /// foreign key enforcement, and run migrations.
    pub fn open(data_dir: &str) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;

        let db_path = Path::new(data_dir).join("parley.db");
        let mut conn = Connection::open(&db_path)?;

        // WAL for concurrent readers alongside the single writer
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::migrations().to_latest(&mut conn)?;

        tracing::info!("Database initialized at {}", db_path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a user row directly. Account provisioning belongs to the
    /// identity service; this exists for bootstrapping and tests.
    pub async fn create_user(&self, username: &str, email: &str) -> Result<User, StoreError> {
        let db = self.db.clone();
        let username = username.to_string();
        let email = email.to_string();
        tokio::task::spawn_blocking(move || -> Result<User, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let now = Utc::now();
            conn.execute(
                "INSERT INTO users (username, email, avatar, is_online, last_seen, created_at, updated_at) \
                 VALUES (?1, ?2, NULL, 0, ?3, ?3, ?3)",
                params![username, email, now],
            )?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                &format!("{USER_SELECT} WHERE id = ?1"),
                params![id],
                user_from_row,
            )?)
        })
        .await?
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        avatar: row.get(3)?,
        is_online: row.get(4)?,
        last_seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let kind: String = row.get(4)?;
    let message_type = MessageKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown message type: {kind}").into(),
        )
    })?;
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        message_type,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
        sender_username: row.get(7)?,
        receiver_username: row.get(8)?,
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<Message, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content, message_type, is_read, created_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    new.sender_id,
                    new.receiver_id,
                    new.content,
                    new.message_type.as_str(),
                    Utc::now()
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                &format!("{MESSAGE_SELECT} WHERE m.id = ?1"),
                params![id],
                message_from_row,
            )?)
        })
        .await?
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<User>, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            Ok(conn
                .query_row(
                    &format!("{USER_SELECT} WHERE id = ?1"),
                    params![user_id],
                    user_from_row,
                )
                .optional()?)
        })
        .await?
    }

    async fn find_message_by_id(&self, message_id: i64) -> Result<Option<Message>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Message>, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            Ok(conn
                .query_row(
                    &format!("{MESSAGE_SELECT} WHERE m.id = ?1"),
                    params![message_id],
                    message_from_row,
                )
                .optional()?)
        })
        .await?
    }

    async fn delete_message_by_id(&self, message_id: i64) -> Result<bool, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<bool, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", params![message_id])?;
            Ok(deleted > 0)
        })
        .await?
    }

    async fn delete_conversation_messages(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<u64, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<u64, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let deleted = conn.execute(
                "DELETE FROM messages \
                 WHERE (sender_id = ?1 AND receiver_id = ?2) \
                    OR (sender_id = ?2 AND receiver_id = ?1)",
                params![user_a, user_b],
            )?;
            Ok(deleted as u64)
        })
        .await?
    }

    async fn delete_all_messages_by_sender(&self, sender_id: i64) -> Result<u64, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<u64, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let deleted =
                conn.execute("DELETE FROM messages WHERE sender_id = ?1", params![sender_id])?;
            Ok(deleted as u64)
        })
        .await?
    }

    async fn mark_message_read(&self, message_id: i64) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            conn.execute(
                "UPDATE messages SET is_read = 1 WHERE id = ?1",
                params![message_id],
            )?;
            Ok(())
        })
        .await?
    }

    async fn mark_conversation_read(
        &self,
        reader_id: i64,
        other_user_id: i64,
    ) -> Result<u64, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<u64, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1 \
                 WHERE sender_id = ?2 AND receiver_id = ?1 AND is_read = 0",
                params![reader_id, other_user_id],
            )?;
            Ok(updated as u64)
        })
        .await?
    }

    async fn conversation_between(
        &self,
        user_a: i64,
        user_b: i64,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Message>, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT} \
                 WHERE (m.sender_id = ?1 AND m.receiver_id = ?2) \
                    OR (m.sender_id = ?2 AND m.receiver_id = ?1) \
                 ORDER BY m.id DESC LIMIT ?3"
            ))?;
            let mut messages = stmt
                .query_map(params![user_a, user_b, limit], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            // Fetched newest-first to apply the cap; return oldest-first.
            messages.reverse();
            Ok(messages)
        })
        .await?
    }

    async fn list_recent_conversation_summaries(
        &self,
        user_id: i64,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<ConversationSummary>, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.avatar, lm.content, lm.created_at, \
                        (SELECT COUNT(*) FROM messages unread \
                          WHERE unread.sender_id = u.id AND unread.receiver_id = ?1 \
                            AND unread.is_read = 0) AS unread_count \
                 FROM ( \
                     SELECT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS partner_id, \
                            MAX(id) AS last_id \
                     FROM messages \
                     WHERE sender_id = ?1 OR receiver_id = ?1 \
                     GROUP BY partner_id \
                 ) conv \
                 JOIN users u ON u.id = conv.partner_id \
                 JOIN messages lm ON lm.id = conv.last_id \
                 ORDER BY conv.last_id DESC",
            )?;
            let summaries = stmt
                .query_map(params![user_id], |row| {
                    Ok(ConversationSummary {
                        other_user_id: row.get(0)?,
                        other_username: row.get(1)?,
                        other_avatar: row.get(2)?,
                        last_message: row.get(3)?,
                        last_message_time: row.get(4)?,
                        unread_count: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(summaries)
        })
        .await?
    }

    async fn count_unread_for_user(&self, user_id: i64) -> Result<i64, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<i64, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE receiver_id = ?1 AND is_read = 0",
                params![user_id],
                |row| row.get(0),
            )?)
        })
        .await?
    }

    async fn set_user_online_status(&self, user_id: i64, online: bool) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            conn.execute(
                "UPDATE users SET is_online = ?2, last_seen = ?3, updated_at = ?3 WHERE id = ?1",
                params![user_id, online, Utc::now()],
            )?;
            Ok(())
        })
        .await?
    }

    async fn list_users(&self, exclude_user_id: Option<i64>) -> Result<Vec<User>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<User>, StoreError> {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let mut stmt = conn.prepare(&format!(
                "{USER_SELECT} WHERE ?1 IS NULL OR id <> ?1 ORDER BY username"
            ))?;
            let users = stmt
                .query_map(params![exclude_user_id], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
        .await?
    }
}
