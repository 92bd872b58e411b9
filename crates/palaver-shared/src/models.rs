//! Domain model structs.
//!
//! Every struct here is both persisted by the store and handed directly
//! to clients as JSON, so field names serialize in camelCase to match
//! the wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChatId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user identity, created lazily on first join with an unseen username.
///
/// For any pair of users, the relation is at most one of: none, pending
/// (one direction only), or friends. The store enforces this at the
/// mutation boundary; `friends` and `pending_requests` here are read-side
/// projections of that bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable server-assigned id.
    pub id: UserId,
    /// Globally unique, case-sensitive.
    pub username: String,
    /// Whether at least one connection is currently bound to this user.
    pub is_online: bool,
    /// Updated only on the transition to offline.
    pub last_seen: Option<DateTime<Utc>>,
    /// Ids of confirmed friends (symmetric).
    pub friends: Vec<UserId>,
    /// Ids of users who have requested friendship with this user
    /// (inbound direction only).
    pub pending_requests: Vec<UserId>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation. Participants are fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    /// At least two distinct users; immutable after creation.
    pub participants: Vec<UserId>,
    /// Pointer to the most recent message, updated on every send.
    pub last_message_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

/// A chat with its participant users and last message resolved, as sent
/// to clients in `initialize`, `newChat` and `friendRequestAccepted`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub id: ChatId,
    pub participants: Vec<User>,
    pub last_message: Option<Message>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Payload kind of a message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Gif,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Gif => "gif",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "image" => MessageKind::Image,
            "gif" => MessageKind::Gif,
            _ => MessageKind::Text,
        }
    }
}

/// A single chat message. Immutable except for `reactions` and `read_by`
/// appends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Append-only; repeated reactions by the same user accumulate.
    pub reactions: Vec<Reaction>,
    /// Users who have read the message. Set semantics: inserting an
    /// already-present user is a no-op.
    pub read_by: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

/// One reaction on a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    pub emoji: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_wire_names() {
        assert_eq!(serde_json::to_string(&MessageKind::Text).unwrap(), "\"text\"");
        assert_eq!(serde_json::to_string(&MessageKind::Gif).unwrap(), "\"gif\"");
        assert_eq!(MessageKind::from_str_lossy("image"), MessageKind::Image);
        assert_eq!(MessageKind::from_str_lossy("unknown"), MessageKind::Text);
    }

    #[test]
    fn message_serializes_camel_case() {
        let msg = Message {
            id: MessageId::new(),
            chat_id: ChatId::new(),
            sender_id: UserId::new(),
            content: "hello".into(),
            kind: MessageKind::Text,
            reactions: vec![],
            read_by: vec![],
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("chatId").is_some());
        assert!(json.get("senderId").is_some());
        assert!(json.get("readBy").is_some());
        assert_eq!(json.get("type").unwrap(), "text");
        assert!(json.get("chat_id").is_none());
    }
}
