//! CRUD operations for [`Chat`] records.
//!
//! Chats are identified internally by a canonical participant key (the
//! sorted participant ids joined with `:`), which is UNIQUE. Creation is
//! therefore idempotent at the storage layer: re-creating a chat for the
//! same participant set returns the existing row.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use palaver_shared::constants::MIN_CHAT_PARTICIPANTS;
use palaver_shared::models::Chat;
use palaver_shared::types::{ChatId, MessageId, UserId};

use crate::database::{parse_timestamp, parse_uuid, Database};
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a chat for the given participant set, or return the
    /// existing one. The returned flag is `true` when a new chat row was
    /// inserted.
    ///
    /// Fails with [`StoreError::InvalidParticipants`] for fewer than two
    /// distinct participants.
    pub fn create_chat(&mut self, participants: &[UserId]) -> Result<(Chat, bool)> {
        let mut ids: Vec<String> = participants.iter().map(|p| p.to_string()).collect();
        ids.sort();
        ids.dedup();
        if ids.len() < MIN_CHAT_PARTICIPANTS {
            return Err(StoreError::InvalidParticipants);
        }
        let key = ids.join(":");

        let tx = self.conn_mut().transaction()?;

        let existing = tx
            .query_row(
                "SELECT id, participant_key, last_message_id, created_at
                 FROM chats WHERE participant_key = ?1",
                params![key],
                row_to_chat,
            )
            .optional()?;

        if let Some(mut chat) = existing {
            chat.participants = load_participants(&tx, chat.id)?;
            tx.commit()?;
            return Ok((chat, false));
        }

        let chat = Chat {
            id: ChatId::new(),
            participants: ids
                .iter()
                .map(|s| Ok(UserId(uuid::Uuid::parse_str(s)?)))
                .collect::<Result<Vec<_>>>()?,
            last_message_id: None,
            created_at: Utc::now(),
        };

        tx.execute(
            "INSERT INTO chats (id, participant_key, last_message_id, created_at)
             VALUES (?1, ?2, NULL, ?3)",
            params![chat.id.to_string(), key, chat.created_at.to_rfc3339()],
        )?;
        for id in &ids {
            tx.execute(
                "INSERT INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                params![chat.id.to_string(), id],
            )?;
        }

        tx.commit()?;
        Ok((chat, true))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by id, with its participant list.
    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        let mut chat = self
            .conn()
            .query_row(
                "SELECT id, participant_key, last_message_id, created_at
                 FROM chats WHERE id = ?1",
                params![id.to_string()],
                row_to_chat,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        chat.participants = load_participants(self.conn(), chat.id)?;
        Ok(chat)
    }

    /// List every chat a user participates in, most recently active
    /// first. Activity is the timestamp of the last message, falling
    /// back to the chat's creation time.
    pub fn chats_for_user(&self, user: UserId) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.participant_key, c.last_message_id, c.created_at
             FROM chats c
             JOIN chat_participants cp ON cp.chat_id = c.id
             LEFT JOIN messages m ON m.id = c.last_message_id
             WHERE cp.user_id = ?1
             ORDER BY COALESCE(m.created_at, c.created_at) DESC",
        )?;

        let rows = stmt.query_map(params![user.to_string()], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            let mut chat = row?;
            chat.participants = load_participants(self.conn(), chat.id)?;
            chats.push(chat);
        }
        Ok(chats)
    }

    /// Whether the user belongs to the chat.
    pub fn is_participant(&self, chat: ChatId, user: UserId) -> Result<bool> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
            params![chat.to_string(), user.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Move the chat's last-message pointer.
    pub fn set_last_message(&self, chat: ChatId, message: MessageId) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE chats SET last_message_id = ?2 WHERE id = ?1",
            params![chat.to_string(), message.to_string()],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Chat`] with an empty participant list.
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id_str: String = row.get(0)?;
    let last_message_str: Option<String> = row.get(2)?;
    let created_str: String = row.get(3)?;

    let id = ChatId(parse_uuid(0, &id_str)?);
    let last_message_id = last_message_str
        .as_deref()
        .map(|s| parse_uuid(2, s))
        .transpose()?
        .map(MessageId);
    let created_at = parse_timestamp(3, &created_str)?;

    Ok(Chat {
        id,
        participants: Vec::new(),
        last_message_id,
        created_at,
    })
}

/// Load the participant ids of a chat, in canonical order.
fn load_participants(conn: &Connection, chat: ChatId) -> Result<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY user_id ASC",
    )?;
    let rows = stmt.query_map(params![chat.to_string()], |row| {
        let s: String = row.get(0)?;
        parse_uuid(0, &s)
    })?;

    let mut participants = Vec::new();
    for row in rows {
        participants.push(UserId(row?));
    }
    Ok(participants)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_chat_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();

        let (first, created) = db.create_chat(&[alice.id, bob.id]).unwrap();
        assert!(created);

        // Same pair, either order, duplicated entries: same chat.
        let (second, created) = db.create_chat(&[bob.id, alice.id, bob.id]).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let chats = db.chats_for_user(alice.id).unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].participants.len(), 2);
    }

    #[test]
    fn create_chat_requires_two_distinct_participants() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();

        assert!(matches!(
            db.create_chat(&[alice.id]),
            Err(StoreError::InvalidParticipants)
        ));
        assert!(matches!(
            db.create_chat(&[alice.id, alice.id]),
            Err(StoreError::InvalidParticipants)
        ));
    }

    #[test]
    fn participant_membership() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();
        let carol = db.create_user("carol").unwrap();

        let (chat, _) = db.create_chat(&[alice.id, bob.id]).unwrap();
        assert!(db.is_participant(chat.id, alice.id).unwrap());
        assert!(!db.is_participant(chat.id, carol.id).unwrap());
    }

    #[test]
    fn chats_order_by_recency() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();
        let carol = db.create_user("carol").unwrap();

        let (older, _) = db.create_chat(&[alice.id, bob.id]).unwrap();
        let (newer, _) = db.create_chat(&[alice.id, carol.id]).unwrap();

        // A message in the older chat bumps it to the top.
        let msg = db
            .create_message(older.id, bob.id, "hello", Default::default())
            .unwrap();
        db.set_last_message(older.id, msg.id).unwrap();

        let chats = db.chats_for_user(alice.id).unwrap();
        assert_eq!(chats[0].id, older.id);
        assert_eq!(chats[1].id, newer.id);
        assert_eq!(chats[0].last_message_id, Some(msg.id));
    }
}
