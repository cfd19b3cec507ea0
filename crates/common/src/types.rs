// Entity projections broadcast over the sockets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of a user embedded in other payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub name: String,
    pub username: String,
}

/// A chat message as clients render it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: UserSummary,
    pub text: Option<String>,
    /// Identifier of an attached upload, if any.
    pub file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Reaction,
    Comment,
    Reply,
    Admin,
}

impl NotificationKind {
    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "REACTION" => Some(Self::Reaction),
            "COMMENT" => Some(Self::Comment),
            "REPLY" => Some(Self::Reply),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A notification as delivered to each receiver's mailbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPayload {
    pub id: Uuid,
    /// Absent for system (`ADMIN`) notifications.
    pub sender: Option<UserSummary>,
    pub ntype: NotificationKind,
    pub text: Option<String>,
    pub post_slug: Option<String>,
    pub comment_slug: Option<String>,
    pub reply_slug: Option<String>,
    pub created_at: DateTime<Utc>,
}
