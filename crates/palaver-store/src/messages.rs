//! CRUD operations for [`Message`] records, reactions and read receipts.

use chrono::Utc;
use rusqlite::params;

use palaver_shared::models::{Message, MessageKind, Reaction};
use palaver_shared::types::{ChatId, MessageId, UserId};

use crate::database::{parse_timestamp, parse_uuid, Database};
use crate::error::{Result, StoreError};

impl Database {
    /// Persist a new message and return it.
    pub fn create_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message> {
        let message = Message {
            id: MessageId::new(),
            chat_id,
            sender_id,
            content: content.to_string(),
            kind,
            reactions: Vec::new(),
            read_by: Vec::new(),
            created_at: Utc::now(),
        };

        self.conn().execute(
            "INSERT INTO messages (id, chat_id, sender_id, content, kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.chat_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                message.kind.as_str(),
                message.created_at.to_rfc3339(),
            ],
        )?;

        Ok(message)
    }

    /// Fetch a message by id, with reactions and read receipts loaded.
    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        let mut message = self
            .conn()
            .query_row(
                "SELECT id, chat_id, sender_id, content, kind, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        message.reactions = self.reactions_for_message(id)?;
        message.read_by = self.readers_of_message(id)?;
        Ok(message)
    }

    /// Append a reaction. Repeated reactions by the same user accumulate.
    pub fn add_reaction(
        &self,
        message_id: MessageId,
        user_id: UserId,
        emoji: &str,
    ) -> Result<Reaction> {
        self.conn()
            .execute(
                "INSERT INTO reactions (message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    message_id.to_string(),
                    user_id.to_string(),
                    emoji,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::NotFound
                }
                other => StoreError::Sqlite(other),
            })?;

        Ok(Reaction {
            user_id,
            emoji: emoji.to_string(),
        })
    }

    /// All reactions on a message, in arrival order.
    pub fn reactions_for_message(&self, message_id: MessageId) -> Result<Vec<Reaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, emoji FROM reactions WHERE message_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let user_str: String = row.get(0)?;
            let emoji: String = row.get(1)?;
            Ok(Reaction {
                user_id: UserId(parse_uuid(0, &user_str)?),
                emoji,
            })
        })?;

        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }

    /// Record that a user read a message. Returns `true` when the receipt
    /// is new; replays are silent no-ops.
    pub fn mark_read(&self, message_id: MessageId, user_id: UserId) -> Result<bool> {
        let affected = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    message_id.to_string(),
                    user_id.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::NotFound
                }
                other => StoreError::Sqlite(other),
            })?;
        Ok(affected > 0)
    }

    /// Users who have read a message, in read order.
    pub fn readers_of_message(&self, message_id: MessageId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM message_reads WHERE message_id = ?1 ORDER BY read_at ASC",
        )?;
        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let s: String = row.get(0)?;
            parse_uuid(0, &s)
        })?;

        let mut readers = Vec::new();
        for row in rows {
            readers.push(UserId(row?));
        }
        Ok(readers)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let chat_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let content: String = row.get(3)?;
    let kind_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    Ok(Message {
        id: MessageId(parse_uuid(0, &id_str)?),
        chat_id: ChatId(parse_uuid(1, &chat_str)?),
        sender_id: UserId(parse_uuid(2, &sender_str)?),
        content,
        kind: MessageKind::from_str_lossy(&kind_str),
        reactions: Vec::new(),
        read_by: Vec::new(),
        created_at: parse_timestamp(5, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(db: &mut Database) -> (UserId, UserId, ChatId) {
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();
        let (chat, _) = db.create_chat(&[alice.id, bob.id]).unwrap();
        (alice.id, bob.id, chat.id)
    }

    #[test]
    fn message_round_trip() {
        let mut db = Database::open_in_memory().unwrap();
        let (alice, _bob, chat) = seed(&mut db);

        let created = db
            .create_message(chat, alice, "hello", MessageKind::Text)
            .unwrap();
        let loaded = db.get_message(created.id).unwrap();

        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.chat_id, chat);
        assert_eq!(loaded.content, "hello");
        assert_eq!(loaded.kind, MessageKind::Text);
        assert!(loaded.reactions.is_empty());
        assert!(loaded.read_by.is_empty());
    }

    #[test]
    fn unknown_message_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_message(MessageId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn reactions_accumulate_in_order() {
        let mut db = Database::open_in_memory().unwrap();
        let (alice, bob, chat) = seed(&mut db);
        let msg = db
            .create_message(chat, alice, "hello", MessageKind::Text)
            .unwrap();

        db.add_reaction(msg.id, bob, "👍").unwrap();
        db.add_reaction(msg.id, alice, "🔥").unwrap();
        // Same user, same emoji again: appended, not deduplicated.
        db.add_reaction(msg.id, bob, "👍").unwrap();

        let loaded = db.get_message(msg.id).unwrap();
        assert_eq!(loaded.reactions.len(), 3);
        assert_eq!(loaded.reactions[0].user_id, bob);
        assert_eq!(loaded.reactions[1].emoji, "🔥");
        assert_eq!(loaded.reactions[2].user_id, bob);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let (alice, bob, chat) = seed(&mut db);
        let msg = db
            .create_message(chat, alice, "hello", MessageKind::Text)
            .unwrap();

        assert!(db.mark_read(msg.id, bob).unwrap());
        assert!(!db.mark_read(msg.id, bob).unwrap());

        let loaded = db.get_message(msg.id).unwrap();
        assert_eq!(loaded.read_by, vec![bob]);
    }
}
