use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use flock_common::protocol::socket::{
    error_codes, error_types, DeletedEntity, EntityFrame, EntryStatus, ErrorFrame,
    InboundEnvelope,
};
use flock_common::types::{ChatMessage, NotificationKind, NotificationPayload, UserSummary};
use uuid::Uuid;

fn sample_message() -> ChatMessage {
    let at = Utc.with_ymd_and_hms(2026, 2, 7, 0, 0, 0).single().expect("timestamp is valid");
    ChatMessage {
        id: Uuid::new_v4(),
        chat_id: Uuid::new_v4(),
        sender: UserSummary { name: "Ada Lovelace".to_string(), username: "ada".to_string() },
        text: Some("hello".to_string()),
        file: None,
        created_at: at,
        updated_at: at,
    }
}

#[test]
fn inbound_envelope_wire_shape() {
    let id = Uuid::new_v4();
    let raw = format!(r#"{{"status":"UPDATED","id":"{id}"}}"#);
    let envelope: InboundEnvelope = serde_json::from_str(&raw).expect("envelope should decode");

    assert_eq!(envelope, InboundEnvelope { status: EntryStatus::Updated, id });
}

#[test]
fn entity_frame_flattens_entity_and_appends_status() {
    let message = sample_message();
    let value = serde_json::to_value(EntityFrame::new(message.clone(), EntryStatus::Created))
        .expect("entity frame should serialize");

    for key in ["id", "chat_id", "sender", "text", "file", "created_at", "updated_at", "status"] {
        assert!(value.get(key).is_some(), "message frame must include `{key}`");
    }
    assert!(value.get("entity").is_none());
    assert_eq!(value["status"], "CREATED");
    assert_eq!(value["sender"]["username"], "ada");

    let decoded: EntityFrame<ChatMessage> =
        serde_json::from_value(value).expect("entity frame should decode");
    assert_eq!(decoded.entity, message);
}

#[test]
fn deletion_frame_carries_only_id_and_status() {
    let id = Uuid::new_v4();
    let value = serde_json::to_value(EntityFrame::new(DeletedEntity { id }, EntryStatus::Deleted))
        .expect("deletion frame should serialize");

    let object = value.as_object().expect("deletion frame is an object");
    assert_eq!(object.len(), 2);
    assert_eq!(value["id"], id.to_string());
    assert_eq!(value["status"], "DELETED");
}

#[test]
fn error_frame_wire_shape() {
    let frame = ErrorFrame::new(error_codes::UNAUTHORIZED, error_types::INVALID_MEMBER, "denied");
    let value = serde_json::to_value(&frame).expect("error frame should serialize");

    assert_eq!(value["status"], "failure");
    assert_eq!(value["code"], 4001);
    assert_eq!(value["type"], "invalid_member");
    assert_eq!(value["message"], "denied");
    assert!(value.get("data").is_none(), "data is omitted when absent");

    let mut data = BTreeMap::new();
    data.insert("status".to_string(), "This field is required".to_string());
    let value = serde_json::to_value(frame.with_data(data)).expect("error frame should serialize");
    assert_eq!(value["data"]["status"], "This field is required");
}

#[test]
fn error_codes_match_documented_values() {
    assert_eq!(error_codes::UNAUTHORIZED, 4001);
    assert_eq!(error_codes::NOT_FOUND, 4004);
    assert_eq!(error_codes::INVALID_ENTRY, 4220);
}

#[test]
fn notification_kind_uses_upper_case_wire_values() {
    let at = Utc.with_ymd_and_hms(2026, 2, 7, 0, 0, 0).single().expect("timestamp is valid");
    let payload = NotificationPayload {
        id: Uuid::new_v4(),
        sender: None,
        ntype: NotificationKind::Reaction,
        text: None,
        post_slug: Some("first-post".to_string()),
        comment_slug: None,
        reply_slug: None,
        created_at: at,
    };
    let value = serde_json::to_value(payload).expect("notification should serialize");

    assert_eq!(value["ntype"], "REACTION");
    assert_eq!(NotificationKind::from_db_value("ADMIN"), Some(NotificationKind::Admin));
    assert_eq!(NotificationKind::from_db_value("admin"), None);
}
