use std::{collections::BTreeMap, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use flock_common::protocol::socket::{EntryStatus, InboundEnvelope};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::SocketError;

const INVALID_JSON: &str = "Invalid Json data";
const REQUIRED_FIELD: &str = "This field is required";
const INVALID_STATUS: &str = "Must be one of: CREATED, UPDATED, DELETED";
const INVALID_ID: &str = "Must be a valid UUID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// Encoded outbound payload, shared between every recipient of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Arc<str>,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Arc<str>>) -> Self {
        Self { kind, payload: payload.into() }
    }

    pub fn encode<T: Serialize>(kind: FrameKind, value: &T) -> Result<Self, SocketError> {
        let payload = serde_json::to_string(value).map_err(SocketError::internal)?;
        Ok(Self::new(kind, payload))
    }

    pub fn into_message(self) -> Message {
        match self.kind {
            FrameKind::Text => Message::Text(self.payload.as_ref().into()),
            FrameKind::Binary => Message::Binary(self.payload.as_bytes().to_vec().into()),
        }
    }
}

pub async fn send_frame(socket: &mut WebSocket, frame: Frame) -> Result<(), SocketError> {
    socket
        .send(frame.into_message())
        .await
        .map_err(|error| SocketError::Transport(error.to_string()))
}

/// Error frames always go out as text, only to the connection that caused them.
pub async fn send_error(socket: &mut WebSocket, error: &SocketError) -> Result<(), SocketError> {
    let frame = Frame::encode(FrameKind::Text, &error.to_frame())?;
    send_frame(socket, frame).await
}

/// Parses an inbound pointer frame.
///
/// Anything that is not a JSON object, or whose `status`/`id` are not
/// strings, fails with "Invalid Json data"; an object with missing or
/// out-of-range fields fails with "Invalid {entity} data" and a per-field
/// message map.
pub fn decode_envelope(raw: &[u8], entity: &str) -> Result<InboundEnvelope, SocketError> {
    let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(raw) else {
        return Err(SocketError::malformed(INVALID_JSON));
    };
    let status = string_field(&object, "status")?;
    let id = string_field(&object, "id")?;

    let mut fields = BTreeMap::new();

    let status = match status {
        None | Some("") => {
            fields.insert("status".to_string(), REQUIRED_FIELD.to_string());
            None
        }
        Some(value) => {
            let parsed = EntryStatus::parse(value);
            if parsed.is_none() {
                fields.insert("status".to_string(), INVALID_STATUS.to_string());
            }
            parsed
        }
    };

    let id = match id {
        None | Some("") => {
            fields.insert("id".to_string(), REQUIRED_FIELD.to_string());
            None
        }
        Some(value) => {
            let parsed = Uuid::parse_str(value).ok();
            if parsed.is_none() {
                fields.insert("id".to_string(), INVALID_ID.to_string());
            }
            parsed
        }
    };

    match (status, id) {
        (Some(status), Some(id)) => Ok(InboundEnvelope { status, id }),
        _ => Err(SocketError::invalid_fields(format!("Invalid {entity} data"), fields)),
    }
}

fn string_field<'a>(
    object: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a str>, SocketError> {
    match object.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(_) => Err(SocketError::malformed(INVALID_JSON)),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_envelope, Frame, FrameKind};
    use crate::ws::error::SocketError;
    use axum::extract::ws::Message;
    use flock_common::protocol::socket::EntryStatus;
    use uuid::Uuid;

    #[test]
    fn decodes_a_well_formed_pointer() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"status":"UPDATED","id":"{id}"}}"#);

        let envelope = decode_envelope(raw.as_bytes(), "Message").expect("valid envelope");

        assert_eq!(envelope.status, EntryStatus::Updated);
        assert_eq!(envelope.id, id);
    }

    #[test]
    fn extra_fields_from_the_client_are_ignored() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"status":"CREATED","id":"{id}","text":"forged"}}"#);

        assert!(decode_envelope(raw.as_bytes(), "Message").is_ok());
    }

    #[test]
    fn broken_json_is_an_invalid_entry() {
        for raw in [&b"{not json"[..], b"[]", b"42", b"null", br#"{"status":5,"id":"x"}"#] {
            let error = decode_envelope(raw, "Message").expect_err("must not decode");
            assert_eq!(error, SocketError::malformed("Invalid Json data"));
            assert_eq!(error.code(), 4220);
        }
    }

    #[test]
    fn positional_arrays_are_not_envelopes() {
        let id = Uuid::new_v4();
        let raw = format!(r#"["UPDATED","{id}"]"#);

        let error = decode_envelope(raw.as_bytes(), "Message").expect_err("arrays must not decode");
        assert_eq!(error, SocketError::malformed("Invalid Json data"));
    }

    #[test]
    fn null_fields_count_as_missing() {
        let error = decode_envelope(br#"{"status":null,"id":null}"#, "Message")
            .expect_err("null fields are required");
        let data = error.to_frame().data.expect("field map");

        assert_eq!(data["status"], "This field is required");
        assert_eq!(data["id"], "This field is required");
    }

    #[test]
    fn missing_fields_produce_a_field_map() {
        let error = decode_envelope(b"{}", "Message").expect_err("fields are required");
        let frame = error.to_frame();

        assert_eq!(frame.message, "Invalid Message data");
        let data = frame.data.expect("field map");
        assert_eq!(data.get("status").map(String::as_str), Some("This field is required"));
        assert_eq!(data.get("id").map(String::as_str), Some("This field is required"));
    }

    #[test]
    fn status_and_id_are_checked_for_range() {
        let error = decode_envelope(br#"{"status":"created","id":"m1"}"#, "Notification")
            .expect_err("lowercase status and non-uuid id");
        let frame = error.to_frame();

        assert_eq!(frame.message, "Invalid Notification data");
        let data = frame.data.expect("field map");
        assert!(data["status"].starts_with("Must be one of"));
        assert_eq!(data["id"], "Must be a valid UUID");
    }

    #[test]
    fn frames_keep_their_kind_on_the_wire() {
        let text = Frame::new(FrameKind::Text, "{}").into_message();
        let binary = Frame::new(FrameKind::Binary, "{}").into_message();

        assert!(matches!(text, Message::Text(_)));
        assert!(matches!(binary, Message::Binary(ref bytes) if bytes.as_ref() == b"{}"));
    }
}
