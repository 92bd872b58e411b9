//! CRUD and friend-graph operations for [`User`] records.
//!
//! The friend graph is kept in two side tables rather than as columns on
//! the user row: `friendships` holds one row per unordered pair (canonical
//! order, smaller id first) and `friend_requests` holds directed pending
//! edges. Both sides of a relation therefore always agree, and the
//! `friends` / `pending_requests` vectors on [`User`] are projections
//! computed at read time.

use chrono::{DateTime, Utc};
use rusqlite::params;

use palaver_shared::models::User;
use palaver_shared::types::UserId;

use crate::database::{parse_timestamp, parse_uuid, Database};
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Create / read
    // ------------------------------------------------------------------

    /// Insert a new user, online, with an empty relation graph.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the username is taken.
    pub fn create_user(&self, username: &str) -> Result<User> {
        let user = User {
            id: UserId::new(),
            username: username.to_string(),
            is_online: true,
            last_seen: None,
            friends: Vec::new(),
            pending_requests: Vec::new(),
            created_at: Utc::now(),
        };

        self.conn()
            .execute(
                "INSERT INTO users (id, username, is_online, last_seen, created_at)
                 VALUES (?1, ?2, ?3, NULL, ?4)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.is_online,
                    user.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::AlreadyExists(username.to_string())
                }
                other => StoreError::Sqlite(other),
            })?;

        Ok(user)
    }

    /// Fetch a user by username (case-sensitive), with relations loaded.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, username, is_online, last_seen, created_at
                 FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Sqlite(other)),
            })?;

        match row {
            Some(mut user) => {
                self.load_relations(&mut user)?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Fetch a user by id, with relations loaded.
    pub fn get_user(&self, id: UserId) -> Result<User> {
        let mut user = self
            .conn()
            .query_row(
                "SELECT id, username, is_online, last_seen, created_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        self.load_relations(&mut user)?;
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Update online state. `last_seen` is only written when provided,
    /// i.e. on the transition to offline.
    pub fn set_online(
        &self,
        id: UserId,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET is_online = ?2, last_seen = COALESCE(?3, last_seen)
             WHERE id = ?1",
            params![
                id.to_string(),
                is_online,
                last_seen.map(|t| t.to_rfc3339()),
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Friend graph
    // ------------------------------------------------------------------

    /// Record a directed pending friend request.
    pub fn create_friend_request(&self, from: UserId, to: UserId) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO friend_requests (from_id, to_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![from.to_string(), to.to_string(), Utc::now().to_rfc3339()],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::AlreadyExists(format!("friend request {from} -> {to}"))
                }
                other => StoreError::Sqlite(other),
            })?;
        Ok(())
    }

    /// Whether a pending request `from -> to` exists.
    pub fn has_friend_request(&self, from: UserId, to: UserId) -> Result<bool> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
            params![from.to_string(), to.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether the two users are friends.
    pub fn are_friends(&self, a: UserId, b: UserId) -> Result<bool> {
        let (lo, hi) = ordered_pair(a, b);
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM friendships WHERE user_a = ?1 AND user_b = ?2",
            params![lo, hi],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Resolve a pending request `requester -> accepter` into a friendship.
    ///
    /// Runs as a single transaction: the pending edge is removed (in both
    /// directions, if a crossed request exists) and the symmetric
    /// friendship row is inserted. Returns `false` without mutating
    /// anything when no matching pending request exists.
    pub fn accept_friend_request(&mut self, accepter: UserId, requester: UserId) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;

        let removed = tx.execute(
            "DELETE FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
            params![requester.to_string(), accepter.to_string()],
        )?;
        if removed == 0 {
            // Dropping the transaction rolls back.
            return Ok(false);
        }

        // A crossed request in the other direction resolves with this accept.
        tx.execute(
            "DELETE FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
            params![accepter.to_string(), requester.to_string()],
        )?;

        let (lo, hi) = ordered_pair(accepter, requester);
        tx.execute(
            "INSERT OR IGNORE INTO friendships (user_a, user_b, created_at)
             VALUES (?1, ?2, ?3)",
            params![lo, hi, Utc::now().to_rfc3339()],
        )?;

        tx.commit()?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn load_relations(&self, user: &mut User) -> Result<()> {
        let id = user.id.to_string();

        let mut stmt = self.conn().prepare(
            "SELECT user_b FROM friendships WHERE user_a = ?1
             UNION
             SELECT user_a FROM friendships WHERE user_b = ?1",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let s: String = row.get(0)?;
            parse_uuid(0, &s)
        })?;
        for row in rows {
            user.friends.push(UserId(row?));
        }

        let mut stmt = self.conn().prepare(
            "SELECT from_id FROM friend_requests WHERE to_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let s: String = row.get(0)?;
            parse_uuid(0, &s)
        })?;
        for row in rows {
            user.pending_requests.push(UserId(row?));
        }

        Ok(())
    }
}

/// Canonical (smaller, larger) ordering of a user pair, as the id strings
/// stored in SQLite. Matches the `CHECK (user_a < user_b)` constraint.
fn ordered_pair(a: UserId, b: UserId) -> (String, String) {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let username: String = row.get(1)?;
    let is_online: bool = row.get(2)?;
    let last_seen_str: Option<String> = row.get(3)?;
    let created_str: String = row.get(4)?;

    let id = UserId(parse_uuid(0, &id_str)?);
    let last_seen = last_seen_str
        .as_deref()
        .map(|s| parse_timestamp(3, s))
        .transpose()?;
    let created_at = parse_timestamp(4, &created_str)?;

    Ok(User {
        id,
        username,
        is_online,
        last_seen,
        friends: Vec::new(),
        pending_requests: Vec::new(),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_fetch_user() {
        let db = Database::open_in_memory().unwrap();

        let created = db.create_user("alice").unwrap();
        assert!(created.is_online);
        assert!(created.last_seen.is_none());

        let found = db.find_user_by_username("alice").unwrap().unwrap();
        assert_eq!(found.id, created.id);

        let by_id = db.get_user(created.id).unwrap();
        assert_eq!(by_id.username, "alice");

        assert!(db.find_user_by_username("Alice").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice").unwrap();

        match db.create_user("alice") {
            Err(StoreError::AlreadyExists(name)) => assert_eq!(name, "alice"),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn presence_transition_records_last_seen() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("alice").unwrap();

        db.set_online(user.id, false, Some(Utc::now())).unwrap();
        let user = db.get_user(user.id).unwrap();
        assert!(!user.is_online);
        assert!(user.last_seen.is_some());

        // Coming back online keeps the previous last_seen.
        let before = user.last_seen;
        db.set_online(user.id, true, None).unwrap();
        let user = db.get_user(user.id).unwrap();
        assert!(user.is_online);
        assert_eq!(user.last_seen, before);
    }

    #[test]
    fn friend_request_lifecycle() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();

        db.create_friend_request(alice.id, bob.id).unwrap();
        assert!(db.has_friend_request(alice.id, bob.id).unwrap());
        assert!(!db.has_friend_request(bob.id, alice.id).unwrap());

        // Pending is visible on the receiving side only.
        let bob_loaded = db.get_user(bob.id).unwrap();
        assert_eq!(bob_loaded.pending_requests, vec![alice.id]);
        let alice_loaded = db.get_user(alice.id).unwrap();
        assert!(alice_loaded.pending_requests.is_empty());

        // Accept resolves the pair to friends, symmetrically.
        assert!(db.accept_friend_request(bob.id, alice.id).unwrap());
        assert!(db.are_friends(alice.id, bob.id).unwrap());
        assert!(db.are_friends(bob.id, alice.id).unwrap());

        let bob_loaded = db.get_user(bob.id).unwrap();
        assert!(bob_loaded.pending_requests.is_empty());
        assert_eq!(bob_loaded.friends, vec![alice.id]);
        let alice_loaded = db.get_user(alice.id).unwrap();
        assert_eq!(alice_loaded.friends, vec![bob.id]);
    }

    #[test]
    fn accept_without_request_is_refused() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();

        assert!(!db.accept_friend_request(bob.id, alice.id).unwrap());
        assert!(!db.are_friends(alice.id, bob.id).unwrap());
    }

    #[test]
    fn duplicate_request_rejected() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();

        db.create_friend_request(alice.id, bob.id).unwrap();
        assert!(matches!(
            db.create_friend_request(alice.id, bob.id),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn crossed_requests_resolve_with_one_accept() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();

        db.create_friend_request(alice.id, bob.id).unwrap();
        db.create_friend_request(bob.id, alice.id).unwrap();

        assert!(db.accept_friend_request(bob.id, alice.id).unwrap());
        assert!(db.are_friends(alice.id, bob.id).unwrap());
        assert!(!db.has_friend_request(alice.id, bob.id).unwrap());
        assert!(!db.has_friend_request(bob.id, alice.id).unwrap());
    }
}
