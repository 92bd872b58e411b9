//! Identity registry: connection↔user binding and presence.
//!
//! `bind` looks up or lazily creates a user by username, marks it online
//! and associates the connection with it. Creation is serialized per
//! username, so concurrent binds of the same unseen username produce
//! exactly one record (the UNIQUE column in the store backs this up).
//!
//! The presence broadcast that accompanies a successful bind is emitted
//! by the dispatch layer after the `initialize` reply, preserving the
//! event order clients expect.

use std::sync::Arc;

use chrono::Utc;

use palaver_shared::models::{ChatSnapshot, User};
use palaver_shared::protocol::ServerEvent;
use palaver_shared::types::UserId;

use crate::directory::ChatDirectory;
use crate::error::{CoreError, Result};
use crate::keyed::KeyedLocks;
use crate::session::{ConnectionId, Sessions};
use crate::SharedDb;

/// Outcome of [`IdentityRegistry::unbind`].
#[derive(Debug, Clone, Copy)]
pub struct Unbound {
    pub user_id: UserId,
    /// True when this was the user's last live connection and the user
    /// was flipped offline.
    pub went_offline: bool,
}

pub struct IdentityRegistry {
    db: SharedDb,
    sessions: Arc<Sessions>,
    directory: Arc<ChatDirectory>,
    bind_locks: KeyedLocks<String>,
}

impl IdentityRegistry {
    pub fn new(db: SharedDb, sessions: Arc<Sessions>, directory: Arc<ChatDirectory>) -> Self {
        Self {
            db,
            sessions,
            directory,
            bind_locks: KeyedLocks::new(),
        }
    }

    /// Resolve the acting user of a connection.
    pub async fn resolve(&self, conn: ConnectionId) -> Result<UserId> {
        self.sessions.resolve(conn).await
    }

    /// Bind a connection to a username.
    ///
    /// Returns the user (created on first sight, marked online) and every
    /// chat they participate in, ordered by recency.
    pub async fn bind(
        &self,
        conn: ConnectionId,
        username: &str,
    ) -> Result<(User, Vec<ChatSnapshot>)> {
        let username = username.trim();
        if username.is_empty() {
            return Err(CoreError::InvalidInput("username must not be empty".into()));
        }

        // Serialize lookup-or-create per username.
        let _guard = self.bind_locks.acquire(username.to_string()).await;

        let user = {
            let db = self.db.lock().await;
            match db.find_user_by_username(username)? {
                Some(user) => {
                    db.set_online(user.id, true, None)?;
                    User {
                        is_online: true,
                        ..user
                    }
                }
                None => {
                    tracing::info!(%username, "creating user on first join");
                    db.create_user(username)?
                }
            }
        };

        self.sessions.bind_user(conn, user.id).await;
        let chats = self.directory.chats_for_user(user.id).await?;

        tracing::debug!(conn = %conn, user = %user.id, %username, "connection bound");
        Ok((user, chats))
    }

    /// Tear down a connection's binding.
    ///
    /// When the user has no other live connection, they are flipped
    /// offline, `last_seen` is recorded, and the status change is
    /// broadcast to every connection.
    pub async fn unbind(&self, conn: ConnectionId) -> Result<Option<Unbound>> {
        let Some(user_id) = self.sessions.remove(conn).await else {
            return Ok(None);
        };

        if self.sessions.connections_of(user_id).await > 0 {
            tracing::debug!(conn = %conn, user = %user_id, "connection closed, others remain");
            return Ok(Some(Unbound {
                user_id,
                went_offline: false,
            }));
        }

        {
            let db = self.db.lock().await;
            db.set_online(user_id, false, Some(Utc::now()))?;
        }
        self.sessions
            .broadcast(&ServerEvent::UserStatus {
                user_id,
                is_online: false,
            })
            .await;

        tracing::debug!(user = %user_id, "user went offline");
        Ok(Some(Unbound {
            user_id,
            went_offline: true,
        }))
    }
}
