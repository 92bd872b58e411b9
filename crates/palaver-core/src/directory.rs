//! Chat directory: conversation membership and last-message tracking.
//!
//! Wraps the store's chat tables and resolves [`ChatSnapshot`]s — chats
//! with their participant users and last message populated, the shape
//! clients receive in `initialize`, `newChat` and
//! `friendRequestAccepted`.

use std::collections::HashSet;

use palaver_shared::constants::MIN_CHAT_PARTICIPANTS;
use palaver_shared::models::{Chat, ChatSnapshot};
use palaver_shared::types::{ChatId, MessageId, UserId};
use palaver_store::Database;

use crate::error::{chat_not_found, CoreError, Result};
use crate::SharedDb;

pub struct ChatDirectory {
    db: SharedDb,
}

impl ChatDirectory {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Every chat the user participates in, most recently active first.
    /// Used at bind time to build the `initialize` payload.
    pub async fn chats_for_user(&self, user: UserId) -> Result<Vec<ChatSnapshot>> {
        let db = self.db.lock().await;
        let chats = db.chats_for_user(user)?;

        let mut snapshots = Vec::with_capacity(chats.len());
        for chat in chats {
            snapshots.push(snapshot(&db, chat)?);
        }
        Ok(snapshots)
    }

    /// Resolve a single chat.
    pub async fn snapshot(&self, chat_id: ChatId) -> Result<ChatSnapshot> {
        let db = self.db.lock().await;
        let chat = db.get_chat(chat_id).map_err(chat_not_found(chat_id))?;
        snapshot(&db, chat)
    }

    /// Create a conversation, or return the existing one for the same
    /// participant set.
    pub async fn create_chat(&self, participants: &[UserId]) -> Result<ChatSnapshot> {
        let distinct: HashSet<&UserId> = participants.iter().collect();
        if distinct.len() < MIN_CHAT_PARTICIPANTS {
            return Err(CoreError::InvalidInput(
                "a conversation requires at least two distinct participants".into(),
            ));
        }

        let mut db = self.db.lock().await;
        let (chat, created) = db.create_chat(participants)?;
        if created {
            tracing::info!(chat = %chat.id, participants = chat.participants.len(), "chat created");
        }
        snapshot(&db, chat)
    }

    /// Move the conversation's last-message pointer.
    pub async fn record_message(&self, chat: ChatId, message: MessageId) -> Result<()> {
        let db = self.db.lock().await;
        db.set_last_message(chat, message)
            .map_err(chat_not_found(chat))
    }
}

/// Populate a chat with its participant users and last message. The
/// caller already holds the store lock.
fn snapshot(db: &Database, chat: Chat) -> Result<ChatSnapshot> {
    let mut participants = Vec::with_capacity(chat.participants.len());
    for id in &chat.participants {
        participants.push(db.get_user(*id)?);
    }

    let last_message = match chat.last_message_id {
        Some(id) => Some(db.get_message(id)?),
        None => None,
    };

    Ok(ChatSnapshot {
        id: chat.id,
        participants,
        last_message,
        created_at: chat.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn directory() -> (ChatDirectory, SharedDb) {
        let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        (ChatDirectory::new(Arc::clone(&db)), db)
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let (directory, db) = directory();
        let (alice, bob) = {
            let db = db.lock().await;
            (
                db.create_user("alice").unwrap().id,
                db.create_user("bob").unwrap().id,
            )
        };

        let first = directory.create_chat(&[alice, bob]).await.unwrap();
        let second = directory.create_chat(&[bob, alice]).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.participants.len(), 2);
    }

    #[tokio::test]
    async fn rejects_degenerate_participant_sets() {
        let (directory, db) = directory();
        let alice = db.lock().await.create_user("alice").unwrap().id;

        assert!(matches!(
            directory.create_chat(&[alice, alice]).await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_resolves_participants_and_last_message() {
        let (directory, db) = directory();
        let (alice, bob) = {
            let db = db.lock().await;
            (
                db.create_user("alice").unwrap().id,
                db.create_user("bob").unwrap().id,
            )
        };

        let chat = directory.create_chat(&[alice, bob]).await.unwrap();
        assert!(chat.last_message.is_none());

        let message = {
            let db = db.lock().await;
            db.create_message(chat.id, alice, "hi", Default::default())
                .unwrap()
        };
        directory.record_message(chat.id, message.id).await.unwrap();

        let snapshot = directory.snapshot(chat.id).await.unwrap();
        assert_eq!(snapshot.last_message.unwrap().id, message.id);
        let names: Vec<_> = snapshot
            .participants
            .iter()
            .map(|u| u.username.as_str())
            .collect();
        assert!(names.contains(&"alice") && names.contains(&"bob"));
    }

    #[tokio::test]
    async fn unknown_chat_is_not_found() {
        let (directory, _db) = directory();
        let missing = ChatId::new();
        assert!(matches!(
            directory.snapshot(missing).await,
            Err(CoreError::ChatNotFound(id)) if id == missing
        ));
    }
}
