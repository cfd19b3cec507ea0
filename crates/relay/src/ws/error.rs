use std::collections::BTreeMap;

use flock_common::protocol::socket::{error_codes, error_types, ErrorFrame};

/// Everything that can go wrong on a socket, from the upgrade to the last frame.
///
/// Join-time failures close the connection after one frame; failures while
/// streaming are answered to the origin connection and the loop continues.
/// `Transport` never produces a frame of its own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    /// Missing, malformed, expired, or revoked credential.
    #[error("{message}")]
    Auth { message: String },

    /// Authenticated but not allowed to join or act.
    #[error("{message}")]
    Authorization { error_type: &'static str, message: String },

    /// Envelope could not be parsed or failed schema validation.
    #[error("{message}")]
    Validation { message: String, fields: Option<BTreeMap<String, String>> },

    /// The target or referenced entity does not exist.
    #[error("{message}")]
    NotFound { error_type: &'static str, message: String },

    /// The referenced entity belongs to someone else.
    #[error("{message}")]
    Ownership { message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    /// Store or serialization failure on the server side.
    #[error("{0}")]
    Internal(String),
}

impl SocketError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    pub fn invalid_member() -> Self {
        Self::Authorization {
            error_type: error_types::INVALID_MEMBER,
            message: "You're not a member of this chat".to_string(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Authorization { error_type: error_types::UNAUTHORIZED, message: message.into() }
    }

    pub fn invalid_target() -> Self {
        Self::NotFound { error_type: error_types::INVALID_INPUT, message: "Invalid ID".to_string() }
    }

    pub fn non_existent(message: impl Into<String>) -> Self {
        Self::NotFound { error_type: error_types::NON_EXISTENT, message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), fields: None }
    }

    pub fn invalid_fields(message: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self::Validation { message: message.into(), fields: Some(fields) }
    }

    pub fn internal(error: impl std::fmt::Display) -> Self {
        Self::Internal(error.to_string())
    }

    pub const fn code(&self) -> u16 {
        match self {
            Self::Auth { .. } | Self::Authorization { .. } | Self::Ownership { .. } => {
                error_codes::UNAUTHORIZED
            }
            Self::NotFound { .. } => error_codes::NOT_FOUND,
            Self::Validation { .. } | Self::Transport(_) => error_codes::INVALID_ENTRY,
            Self::Internal(_) => error_codes::SERVER_ERROR,
        }
    }

    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Auth { .. } => error_types::INVALID_TOKEN,
            Self::Authorization { error_type, .. } | Self::NotFound { error_type, .. } => *error_type,
            Self::Validation { .. } | Self::Transport(_) => error_types::INVALID_ENTRY,
            Self::Ownership { .. } => error_types::INVALID_OWNER,
            Self::Internal(_) => error_types::SERVER_ERROR,
        }
    }

    /// Wire frame for the origin connection. Internal details stay in the logs.
    pub fn to_frame(&self) -> ErrorFrame {
        let message = match self {
            Self::Internal(_) => "Something went wrong".to_string(),
            Self::Transport(_) => "Invalid Entry".to_string(),
            other => other.to_string(),
        };
        let frame = ErrorFrame::new(self.code(), self.error_type(), message);

        match self {
            Self::Validation { fields: Some(fields), .. } => frame.with_data(fields.clone()),
            _ => frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SocketError;
    use std::collections::BTreeMap;

    #[test]
    fn taxonomy_maps_to_documented_codes() {
        assert_eq!(SocketError::auth("Auth bearer not set").code(), 4001);
        assert_eq!(SocketError::invalid_member().code(), 4001);
        assert_eq!(SocketError::invalid_target().code(), 4004);
        assert_eq!(SocketError::non_existent("Invalid message ID").code(), 4004);
        assert_eq!(SocketError::malformed("Invalid Json data").code(), 4220);
        assert_eq!(SocketError::Ownership { message: "no".into() }.code(), 4001);
    }

    #[test]
    fn error_types_follow_the_failure() {
        assert_eq!(SocketError::auth("x").error_type(), "invalid_token");
        assert_eq!(SocketError::invalid_member().error_type(), "invalid_member");
        assert_eq!(SocketError::invalid_target().error_type(), "invalid_input");
        assert_eq!(SocketError::unauthorized("x").error_type(), "unauthorized");
        assert_eq!(SocketError::non_existent("x").error_type(), "non_existent");
        assert_eq!(SocketError::Ownership { message: "x".into() }.error_type(), "invalid_owner");
    }

    #[test]
    fn validation_frame_carries_field_map() {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), "This field is required".to_string());

        let frame = SocketError::invalid_fields("Invalid Message data", fields).to_frame();

        assert_eq!(frame.status, "failure");
        assert_eq!(frame.message, "Invalid Message data");
        assert_eq!(
            frame.data.and_then(|data| data.get("id").cloned()).as_deref(),
            Some("This field is required")
        );
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let frame = SocketError::internal("connection refused (os error 111)").to_frame();
        assert_eq!(frame.code, 5000);
        assert!(!frame.message.contains("os error"));
    }
}
