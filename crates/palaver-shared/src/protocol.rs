//! The JSON event protocol spoken over the persistent client channel.
//!
//! Every frame is a text frame of the form
//! `{"event": "<name>", "data": {...}}`. Event names and payload fields
//! are camelCase.

use serde::{Deserialize, Serialize};

use crate::models::{ChatSnapshot, Message, MessageKind, Reaction, User};
use crate::types::{ChatId, MessageId, UserId};

/// Events a client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to a username, creating the user on first
    /// sight. Answered with `initialize`.
    Join { username: String },

    /// Post a message to a conversation.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        chat_id: ChatId,
        content: String,
        #[serde(rename = "type", default)]
        kind: MessageKind,
    },

    /// Request friendship with another user, by username.
    SendFriendRequest { username: String },

    /// Accept a pending friend request from `username`.
    AcceptFriendRequest { username: String },

    /// React to a message.
    #[serde(rename_all = "camelCase")]
    AddReaction { message_id: MessageId, emoji: String },

    /// Record that the acting user has read a message.
    #[serde(rename_all = "camelCase")]
    MarkRead { message_id: MessageId },

    /// The acting user started (or is still) typing in a chat.
    #[serde(rename_all = "camelCase")]
    Typing { chat_id: ChatId },

    /// The acting user stopped typing in a chat.
    #[serde(rename_all = "camelCase")]
    StopTyping { chat_id: ChatId },
}

/// Events the server sends to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Reply to `join`: the bound user plus every chat they participate
    /// in, ordered by recency.
    Initialize { user: User, chats: Vec<ChatSnapshot> },

    /// A user's online state changed. Broadcast to all connections.
    #[serde(rename_all = "camelCase")]
    UserStatus { user_id: UserId, is_online: bool },

    /// A new message, with the sender identity resolved. Sent to every
    /// connection of every participant of the chat.
    NewMessage { message: Message, sender: User },

    /// Someone requested friendship with the receiving user.
    FriendRequest { from: String },

    /// A friend request the receiving user sent was accepted; the new
    /// chat is fully populated.
    FriendRequestAccepted { username: String, chat: ChatSnapshot },

    /// A chat was created for the receiving user (accepter side).
    NewChat { chat: ChatSnapshot },

    /// A reaction was appended to a message.
    #[serde(rename_all = "camelCase")]
    MessageReaction {
        message_id: MessageId,
        reaction: Reaction,
    },

    /// A user read a message for the first time.
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: MessageId,
        user_id: UserId,
    },

    /// A participant started typing.
    #[serde(rename_all = "camelCase")]
    UserTyping { user_id: UserId, chat_id: ChatId },

    /// A participant stopped typing (explicitly or by timeout).
    #[serde(rename_all = "camelCase")]
    UserStoppedTyping { user_id: UserId, chat_id: ChatId },

    /// A handler failed; delivered only to the originating connection.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_roundtrip() {
        let event = ClientEvent::SendMessage {
            chat_id: ChatId::new(),
            content: "hello there".into(),
            kind: MessageKind::Gif,
        };

        let json = serde_json::to_string(&event).unwrap();
        let restored: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn client_event_wire_shape() {
        let json = serde_json::json!({
            "event": "sendMessage",
            "data": { "chatId": uuid::Uuid::new_v4(), "content": "hi" }
        });

        // `type` is optional and defaults to text.
        let event: ClientEvent = serde_json::from_value(json).unwrap();
        match event {
            ClientEvent::SendMessage { kind, content, .. } => {
                assert_eq!(kind, MessageKind::Text);
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn join_event_name_is_camel_case() {
        let event = ClientEvent::Join {
            username: "alice".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json.get("event").unwrap(), "join");

        let event = ClientEvent::AcceptFriendRequest {
            username: "bob".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json.get("event").unwrap(), "acceptFriendRequest");
    }

    #[test]
    fn server_event_wire_shape() {
        let event = ServerEvent::UserStatus {
            user_id: UserId::new(),
            is_online: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json.get("event").unwrap(), "userStatus");
        assert_eq!(json["data"]["isOnline"], true);
        assert!(json["data"].get("userId").is_some());
    }
}
