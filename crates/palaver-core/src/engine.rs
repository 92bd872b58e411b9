//! The coordination core: owns every component and dispatches inbound
//! events.
//!
//! Each inbound [`ClientEvent`] is routed to the responsible component;
//! any [`CoreError`] is converted to an `error` event delivered to the
//! originating connection only. A failing handler never terminates the
//! connection and never leaks to other connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use palaver_shared::constants::{DEFAULT_MAX_MESSAGE_LEN, DEFAULT_TYPING_TIMEOUT_MS};
use palaver_shared::protocol::{ClientEvent, ServerEvent};
use palaver_store::Database;

use crate::directory::ChatDirectory;
use crate::error::{CoreError, Result};
use crate::friends::FriendWorkflow;
use crate::registry::IdentityRegistry;
use crate::router::MessageRouter;
use crate::session::{ConnectionId, Sessions};
use crate::typing::TypingTracker;
use crate::SharedDb;

/// Tunables for the coordination core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Typing indicator auto-expiry window.
    pub typing_timeout: Duration,
    /// Maximum accepted message content length, in bytes.
    pub max_message_len: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            typing_timeout: Duration::from_millis(DEFAULT_TYPING_TIMEOUT_MS),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

/// The session, presence and messaging coordination layer.
pub struct ChatCore {
    sessions: Arc<Sessions>,
    registry: IdentityRegistry,
    friends: FriendWorkflow,
    router: MessageRouter,
    typing: TypingTracker,
}

impl ChatCore {
    pub fn new(db: Database, config: CoreConfig) -> Self {
        let db: SharedDb = Arc::new(Mutex::new(db));
        let sessions = Arc::new(Sessions::new());
        let directory = Arc::new(ChatDirectory::new(Arc::clone(&db)));

        Self {
            registry: IdentityRegistry::new(
                Arc::clone(&db),
                Arc::clone(&sessions),
                Arc::clone(&directory),
            ),
            friends: FriendWorkflow::new(
                Arc::clone(&db),
                Arc::clone(&sessions),
                Arc::clone(&directory),
            ),
            router: MessageRouter::new(
                Arc::clone(&db),
                Arc::clone(&sessions),
                Arc::clone(&directory),
                config.max_message_len,
            ),
            typing: TypingTracker::new(Arc::clone(&db), Arc::clone(&sessions), config.typing_timeout),
            sessions,
        }
    }

    /// Register a new connection. Events addressed to it are pushed into
    /// `outbound`, which the transport's writer task drains.
    pub async fn connect(&self, outbound: mpsc::UnboundedSender<ServerEvent>) -> ConnectionId {
        let conn = self.sessions.register(outbound).await;
        tracing::debug!(conn = %conn, "connection registered");
        conn
    }

    /// Tear down a connection (the implicit `disconnect` event): flips
    /// presence when this was the user's last connection and releases
    /// any typing indicators they held.
    pub async fn disconnect(&self, conn: ConnectionId) {
        match self.registry.unbind(conn).await {
            Ok(Some(unbound)) if unbound.went_offline => {
                self.typing.clear_user(unbound.user_id).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(conn = %conn, error = %e, "disconnect bookkeeping failed");
            }
        }
    }

    /// Report a transport-level failure (e.g. a malformed frame) to a
    /// connection, using the same `error` event as handler failures.
    pub async fn report_error(&self, conn: ConnectionId, message: String) {
        self.sessions
            .send_to_connection(conn, ServerEvent::Error { message })
            .await;
    }

    /// Dispatch one inbound event.
    pub async fn handle(&self, conn: ConnectionId, event: ClientEvent) {
        if let Err(e) = self.dispatch(conn, event).await {
            tracing::debug!(conn = %conn, error = %e, "handler failed");
            self.sessions
                .send_to_connection(
                    conn,
                    ServerEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
        }
    }

    async fn dispatch(&self, conn: ConnectionId, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Join { username } => {
                let (user, chats) = self.registry.bind(conn, &username).await?;
                let user_id = user.id;
                self.sessions
                    .send_to_connection(conn, ServerEvent::Initialize { user, chats })
                    .await;
                self.sessions
                    .broadcast(&ServerEvent::UserStatus {
                        user_id,
                        is_online: true,
                    })
                    .await;
                Ok(())
            }

            ClientEvent::SendMessage {
                chat_id,
                content,
                kind,
            } => {
                let sender = self.registry.resolve(conn).await?;
                self.router.send(sender, chat_id, &content, kind).await?;
                Ok(())
            }

            ClientEvent::SendFriendRequest { username } => {
                let from = self.registry.resolve(conn).await?;
                self.friends.send_request(from, &username).await
            }

            ClientEvent::AcceptFriendRequest { username } => {
                let accepter = self.registry.resolve(conn).await?;
                self.friends.accept_request(accepter, &username).await?;
                Ok(())
            }

            ClientEvent::AddReaction { message_id, emoji } => {
                let user = self.registry.resolve(conn).await?;
                self.router.add_reaction(user, message_id, &emoji).await?;
                Ok(())
            }

            ClientEvent::MarkRead { message_id } => {
                let user = self.registry.resolve(conn).await?;
                self.router.mark_read(user, message_id).await
            }

            ClientEvent::Typing { chat_id } => {
                let user = self.registry.resolve(conn).await?;
                self.typing.set_typing(user, chat_id).await
            }

            ClientEvent::StopTyping { chat_id } => {
                let user = self.registry.resolve(conn).await?;
                self.typing.stop_typing(user, chat_id).await
            }
        }
    }
}
