use std::fmt;

use tracing::error;
use uuid::Uuid;

use super::error::SocketError;
use crate::{
    auth::identity::Identity,
    store::{ChatRecord, SocialStore, UserRecord},
};

/// Group the notification service publishes from; nothing is routed to it.
pub const NOTIFICATION_PUBLISHER_GROUP: &str = "notification_service";

/// Chat-stream group for a resolved chat or user id. Keying on the resolved
/// id puts every spelling of the same target (username, id, id casing) in
/// one group.
pub fn chat_group(key: impl fmt::Display) -> String {
    format!("chat_{key}")
}

pub fn notification_group(user_id: Uuid) -> String {
    format!("notification_{user_id}")
}

/// Where a connection is allowed to listen, decided at join time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGrant {
    pub group: String,
    pub shadow_target: Option<Uuid>,
}

#[derive(Debug)]
enum ResolvedTarget {
    Chat(ChatRecord),
    User(UserRecord),
}

/// Authorizes a chat-stream join for `target` (chat id, user id, or username).
pub async fn authorize_chat_join(
    store: &SocialStore,
    identity: &Identity,
    target: &str,
) -> Result<JoinGrant, SocketError> {
    let user = match identity {
        Identity::Service => return Ok(service_chat_join(store, target).await),
        Identity::User(user) => user,
    };

    if Uuid::parse_str(target).is_ok_and(|id| id == user.id) {
        return Ok(self_mailbox(user.id));
    }

    match resolve_target(store, target).await? {
        None => Err(SocketError::invalid_target()),
        Some(ResolvedTarget::User(target_user)) if target_user.id == user.id => {
            Ok(self_mailbox(user.id))
        }
        Some(ResolvedTarget::User(_)) => Err(SocketError::invalid_member()),
        Some(ResolvedTarget::Chat(chat)) => {
            if chat.owner_id == user.id || is_member(store, &chat, user.id).await? {
                Ok(JoinGrant { group: chat_group(chat.id), shadow_target: None })
            } else {
                Err(SocketError::invalid_member())
            }
        }
    }
}

fn self_mailbox(user_id: Uuid) -> JoinGrant {
    JoinGrant { group: chat_group(user_id), shadow_target: Some(user_id) }
}

/// Services observe without membership. Resolution only picks the group key
/// and the shadow target, so it never rejects the join.
async fn service_chat_join(store: &SocialStore, target: &str) -> JoinGrant {
    match resolve_target(store, target).await {
        Ok(Some(ResolvedTarget::User(user))) => self_mailbox(user.id),
        Ok(Some(ResolvedTarget::Chat(chat))) => {
            JoinGrant { group: chat_group(chat.id), shadow_target: None }
        }
        Ok(None) | Err(_) => JoinGrant { group: chat_group(target), shadow_target: None },
    }
}

/// Notification mailboxes are always the caller's own.
pub fn notification_join(identity: &Identity) -> JoinGrant {
    match identity {
        Identity::User(user) => {
            JoinGrant { group: notification_group(user.id), shadow_target: Some(user.id) }
        }
        Identity::Service => {
            JoinGrant { group: NOTIFICATION_PUBLISHER_GROUP.to_string(), shadow_target: None }
        }
    }
}

async fn resolve_target(
    store: &SocialStore,
    target: &str,
) -> Result<Option<ResolvedTarget>, SocketError> {
    let resolved = match Uuid::parse_str(target) {
        Ok(id) => match store.chat_by_id(id).await {
            Ok(Some(chat)) => Ok(Some(ResolvedTarget::Chat(chat))),
            Ok(None) => store.user_by_id(id).await.map(|user| user.map(ResolvedTarget::User)),
            Err(error) => Err(error),
        },
        Err(_) => store.user_by_username(target).await.map(|user| user.map(ResolvedTarget::User)),
    };

    resolved.map_err(|error| {
        error!(error = ?error, join_target = target, "failed to resolve socket target");
        SocketError::internal(error)
    })
}

async fn is_member(store: &SocialStore, chat: &ChatRecord, user_id: Uuid) -> Result<bool, SocketError> {
    store.user_is_member(chat.id, user_id).await.map_err(|error| {
        error!(error = ?error, chat_id = %chat.id, user_id = %user_id, "failed to check chat membership");
        SocketError::internal(error)
    })
}
