// Turns inbound pointer frames into server-built broadcast payloads.
//
// The client only ever supplies `{status, id}`; everything that goes out is
// re-read from the store.

use flock_common::protocol::socket::{DeletedEntity, EntityFrame, EntryStatus};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use super::{error::SocketError, membership::notification_group, protocol::decode_envelope};
use crate::{auth::identity::Identity, store::SocialStore};

/// A validated payload and the groups it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub groups: Vec<String>,
    pub payload: String,
}

/// Validates a chat-stream frame; the payload is broadcast to `group`.
pub async fn validate_chat_entry(
    store: &SocialStore,
    identity: &Identity,
    group: &str,
    raw: &[u8],
) -> Result<Delivery, SocketError> {
    let envelope = decode_envelope(raw, "Message")?;

    if envelope.status.is_deletion() {
        if !identity.is_privileged() {
            return Err(SocketError::unauthorized("Not allowed to send deletion socket message"));
        }
        return deletion(vec![group.to_string()], envelope.id);
    }

    let message = store
        .message_by_id(envelope.id)
        .await
        .map_err(|error| {
            error!(error = ?error, message_id = %envelope.id, "failed to load chat message");
            SocketError::internal(error)
        })?
        .ok_or_else(|| SocketError::non_existent("Invalid message ID"))?;

    if let Identity::User(user) = identity {
        if message.sender_id != user.id {
            return Err(SocketError::Ownership { message: "Message isn't yours".to_string() });
        }
    }

    encode(vec![group.to_string()], &EntityFrame::new(message.to_wire(), envelope.status))
}

/// Validates a notification-stream frame. Only the service publishes; the
/// payload fans out to every receiver's mailbox.
pub async fn validate_notification_entry(
    store: &SocialStore,
    identity: &Identity,
    raw: &[u8],
) -> Result<Delivery, SocketError> {
    if !identity.is_privileged() {
        return Err(SocketError::unauthorized("Not allowed to send notification socket message"));
    }

    let envelope = decode_envelope(raw, "Notification")?;

    let notification = store
        .notification_by_id(envelope.id)
        .await
        .map_err(|error| {
            error!(error = ?error, notification_id = %envelope.id, "failed to load notification");
            SocketError::internal(error)
        })?
        .ok_or_else(|| SocketError::non_existent("Invalid notification ID"))?;

    let groups = notification.receiver_ids.iter().copied().map(notification_group).collect();

    match envelope.status {
        EntryStatus::Deleted => deletion(groups, notification.id),
        status => encode(groups, &EntityFrame::new(notification.to_wire(), status)),
    }
}

fn deletion(groups: Vec<String>, id: Uuid) -> Result<Delivery, SocketError> {
    encode(groups, &EntityFrame::new(DeletedEntity { id }, EntryStatus::Deleted))
}

fn encode<T: Serialize>(groups: Vec<String>, frame: &T) -> Result<Delivery, SocketError> {
    let payload = serde_json::to_string(frame).map_err(SocketError::internal)?;
    Ok(Delivery { groups, payload })
}
