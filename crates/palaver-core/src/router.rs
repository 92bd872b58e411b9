//! Message fan-out router.
//!
//! Validates and persists sends, reactions and read receipts, then
//! delivers the resulting events to every live connection of every
//! participant of the affected conversation. A per-chat lock is held
//! across persist + fan-out, so all subscribed connections observe
//! messages of one conversation in the order the router accepted them.

use std::sync::Arc;

use palaver_shared::models::{Message, MessageKind, Reaction};
use palaver_shared::protocol::ServerEvent;
use palaver_shared::types::{ChatId, MessageId, UserId};

use crate::directory::ChatDirectory;
use crate::error::{chat_not_found, message_not_found, user_not_found, CoreError, Result};
use crate::keyed::KeyedLocks;
use crate::session::Sessions;
use crate::SharedDb;

pub struct MessageRouter {
    db: SharedDb,
    sessions: Arc<Sessions>,
    directory: Arc<ChatDirectory>,
    chat_locks: KeyedLocks<ChatId>,
    max_message_len: usize,
}

impl MessageRouter {
    pub fn new(
        db: SharedDb,
        sessions: Arc<Sessions>,
        directory: Arc<ChatDirectory>,
        max_message_len: usize,
    ) -> Self {
        Self {
            db,
            sessions,
            directory,
            chat_locks: KeyedLocks::new(),
            max_message_len,
        }
    }

    /// Accept a message into a conversation and fan it out.
    pub async fn send(
        &self,
        sender: UserId,
        chat_id: ChatId,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "message content must not be empty".into(),
            ));
        }
        if content.len() > self.max_message_len {
            return Err(CoreError::InvalidInput(format!(
                "message exceeds {} bytes",
                self.max_message_len
            )));
        }

        // Per-conversation ordering: held across persist and fan-out.
        let _guard = self.chat_locks.acquire(chat_id).await;

        let (message, sender_user, participants) = {
            let db = self.db.lock().await;
            let chat = db.get_chat(chat_id).map_err(chat_not_found(chat_id))?;
            if !chat.participants.contains(&sender) {
                return Err(CoreError::Forbidden);
            }
            let sender_user = db.get_user(sender).map_err(user_not_found)?;
            let message = db.create_message(chat_id, sender, content, kind)?;
            (message, sender_user, chat.participants)
        };

        self.directory.record_message(chat_id, message.id).await?;

        tracing::debug!(
            chat = %chat_id,
            message = %message.id,
            sender = %sender_user.username,
            "message routed"
        );

        self.sessions
            .send_to_users(
                &participants,
                &ServerEvent::NewMessage {
                    message: message.clone(),
                    sender: sender_user,
                },
            )
            .await;

        Ok(message)
    }

    /// Append a reaction to a message and fan it out to the owning chat.
    pub async fn add_reaction(
        &self,
        user: UserId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<Reaction> {
        if emoji.trim().is_empty() {
            return Err(CoreError::InvalidInput("emoji must not be empty".into()));
        }

        let (reaction, participants) = {
            let db = self.db.lock().await;
            let message = db
                .get_message(message_id)
                .map_err(message_not_found(message_id))?;
            let chat = db
                .get_chat(message.chat_id)
                .map_err(chat_not_found(message.chat_id))?;
            let reaction = db.add_reaction(message_id, user, emoji)?;
            (reaction, chat.participants)
        };

        tracing::debug!(message = %message_id, user = %user, "reaction added");

        self.sessions
            .send_to_users(
                &participants,
                &ServerEvent::MessageReaction {
                    message_id,
                    reaction: reaction.clone(),
                },
            )
            .await;

        Ok(reaction)
    }

    /// Record that `user` has read a message. Idempotent: replays change
    /// nothing and stay silent.
    pub async fn mark_read(&self, user: UserId, message_id: MessageId) -> Result<()> {
        let (newly_read, participants) = {
            let db = self.db.lock().await;
            let message = db
                .get_message(message_id)
                .map_err(message_not_found(message_id))?;
            let chat = db
                .get_chat(message.chat_id)
                .map_err(chat_not_found(message.chat_id))?;
            let newly_read = db.mark_read(message_id, user)?;
            (newly_read, chat.participants)
        };

        if newly_read {
            self.sessions
                .send_to_users(
                    &participants,
                    &ServerEvent::MessageRead {
                        message_id,
                        user_id: user,
                    },
                )
                .await;
        }
        Ok(())
    }
}
