//! Live connection registry.
//!
//! Each WebSocket connection registers an outbound event queue here and
//! receives a [`ConnectionId`]. Once the connection has joined, it is
//! bound to a [`UserId`]; a user may hold several simultaneous
//! connections, and fan-out is per connection, not per user.
//!
//! This registry is an in-memory index only. It is populated exclusively
//! from live connection state and store reads, and holds nothing that
//! cannot be rebuilt after a restart.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use palaver_shared::protocol::ServerEvent;
use palaver_shared::types::UserId;

use crate::error::{CoreError, Result};

/// Identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Connection {
    /// Bound user, set by `join`.
    user_id: Option<UserId>,
    /// Outbound event queue drained by the connection's writer task.
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

/// Registry of live connections.
pub struct Sessions {
    inner: RwLock<HashMap<ConnectionId, Connection>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection and return its id.
    pub async fn register(&self, outbound: mpsc::UnboundedSender<ServerEvent>) -> ConnectionId {
        let id = ConnectionId::new();
        self.inner.write().await.insert(
            id,
            Connection {
                user_id: None,
                outbound,
            },
        );
        id
    }

    /// Drop a connection, returning the user it was bound to, if any.
    pub async fn remove(&self, conn: ConnectionId) -> Option<UserId> {
        self.inner.write().await.remove(&conn).and_then(|c| c.user_id)
    }

    /// Bind a connection to a user identity.
    pub async fn bind_user(&self, conn: ConnectionId, user: UserId) {
        if let Some(connection) = self.inner.write().await.get_mut(&conn) {
            connection.user_id = Some(user);
        }
    }

    /// Resolve the acting user of a connection.
    pub async fn resolve(&self, conn: ConnectionId) -> Result<UserId> {
        self.inner
            .read()
            .await
            .get(&conn)
            .and_then(|c| c.user_id)
            .ok_or(CoreError::Unauthenticated)
    }

    /// Number of live connections currently bound to a user.
    pub async fn connections_of(&self, user: UserId) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|c| c.user_id == Some(user))
            .count()
    }

    /// Queue an event for a single connection.
    pub async fn send_to_connection(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.inner.read().await.get(&conn) {
            if connection.outbound.send(event).is_err() {
                tracing::debug!(conn = %conn, "outbound queue closed, dropping event");
            }
        }
    }

    /// Queue an event for every connection of a user.
    pub async fn send_to_user(&self, user: UserId, event: &ServerEvent) {
        self.send_to_users(std::slice::from_ref(&user), event).await;
    }

    /// Queue an event for every connection of every listed user. Each
    /// connection receives its own copy.
    pub async fn send_to_users(&self, users: &[UserId], event: &ServerEvent) {
        let inner = self.inner.read().await;
        for (id, connection) in inner.iter() {
            let Some(user) = connection.user_id else {
                continue;
            };
            if users.contains(&user) && connection.outbound.send(event.clone()).is_err() {
                tracing::debug!(conn = %id, "outbound queue closed, dropping event");
            }
        }
    }

    /// Queue an event for every live connection, joined or not.
    pub async fn broadcast(&self, event: &ServerEvent) {
        let inner = self.inner.read().await;
        for (id, connection) in inner.iter() {
            if connection.outbound.send(event.clone()).is_err() {
                tracing::debug!(conn = %id, "outbound queue closed, dropping event");
            }
        }
    }
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new()
    }
}
