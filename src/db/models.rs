/// Row types for the users and messages tables, shared with the wire
/// protocol — what the store returns is what clients receive.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message content kind. Plain text unless the client says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "file" => Some(MessageKind::File),
            _ => None,
        }
    }
}

/// A persisted direct message. Participant usernames are joined in on every
/// read so clients never need a second lookup to render a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub message_type: MessageKind,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub sender_username: String,
    pub receiver_username: String,
}

/// User record. `is_online` and `last_seen` are advisory snapshots written
/// on presence transitions; the session registry is the live source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One sidebar row: the other participant plus the latest message between
/// the caller and them, and how many of their messages the caller has unread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub other_user_id: i64,
    pub other_username: String,
    pub other_avatar: Option<String>,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: i64,
}

/// Input for the single authoritative message write. Content arrives here
/// already validated.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub message_type: MessageKind,
}
