// Frame types for the chat and notification sockets.
//
// Clients never send entity bodies. An inbound frame is a pointer
// (`status` + `id`) that the relay resolves against the store before
// anything is broadcast.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of `status` on every error frame.
pub const FAILURE_STATUS: &str = "failure";

/// Numeric codes carried in error frames.
pub mod error_codes {
    pub const UNAUTHORIZED: u16 = 4001;
    pub const NOT_FOUND: u16 = 4004;
    pub const INVALID_ENTRY: u16 = 4220;
    pub const SERVER_ERROR: u16 = 5000;
}

/// Machine-readable `type` values carried in error frames.
pub mod error_types {
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INVALID_MEMBER: &str = "invalid_member";
    pub const INVALID_ENTRY: &str = "invalid_entry";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NON_EXISTENT: &str = "non_existent";
    pub const INVALID_OWNER: &str = "invalid_owner";
    pub const SERVER_ERROR: &str = "server_error";
}

/// Lifecycle event an inbound pointer refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Created,
    Updated,
    Deleted,
}

impl EntryStatus {
    pub const ALL: [Self; 3] = [Self::Created, Self::Updated, Self::Deleted];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        }
    }

    /// Exact, case-sensitive match against the wire value.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    pub const fn is_deletion(self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client -> Server: `{"status":"UPDATED","id":"<uuid>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub status: EntryStatus,
    pub id: Uuid,
}

/// Server -> Client: the entity's own fields with `status` appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFrame<T> {
    #[serde(flatten)]
    pub entity: T,
    pub status: EntryStatus,
}

impl<T> EntityFrame<T> {
    pub fn new(entity: T, status: EntryStatus) -> Self {
        Self { entity, status }
    }
}

/// Entity body of a deletion frame; only the pointer survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedEntity {
    pub id: Uuid,
}

/// Server -> Client: sent only to the connection that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub status: String,
    pub code: u16,
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

impl ErrorFrame {
    pub fn new(code: u16, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: FAILURE_STATUS.to_string(),
            code,
            error_type: error_type.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{EntryStatus, ErrorFrame, InboundEnvelope};

    #[test]
    fn entry_status_parse_is_case_sensitive() {
        assert_eq!(EntryStatus::parse("CREATED"), Some(EntryStatus::Created));
        assert_eq!(EntryStatus::parse("DELETED"), Some(EntryStatus::Deleted));
        assert_eq!(EntryStatus::parse("created"), None);
        assert_eq!(EntryStatus::parse(""), None);
    }

    #[test]
    fn inbound_envelope_rejects_unknown_status() {
        let raw = r#"{"status":"ARCHIVED","id":"6f1c8e0e-0000-4000-8000-000000000001"}"#;
        assert!(serde_json::from_str::<InboundEnvelope>(raw).is_err());
    }

    #[test]
    fn error_frame_type_field_is_renamed() {
        let value = serde_json::to_value(ErrorFrame::new(4001, "unauthorized", "nope"))
            .expect("error frame should serialize");
        assert_eq!(value["type"], "unauthorized");
        assert!(value.get("error_type").is_none());
    }
}
