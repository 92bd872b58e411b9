//! Ephemeral typing indicators.
//!
//! Non-persisted state keyed by `(user, chat)`: a `typing` event starts
//! or refreshes a timer; if neither a refresh nor a `stopTyping` arrives
//! within the timeout window, the tracker expires the indicator and
//! broadcasts `userStoppedTyping` on its own. Indicators for the same
//! user in different chats are independent.
//!
//! Each timer carries a token so a late expiry task can recognise that
//! it was superseded by a refresh and back off.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use palaver_shared::protocol::ServerEvent;
use palaver_shared::types::{ChatId, UserId};

use crate::error::{chat_not_found, CoreError, Result};
use crate::session::Sessions;
use crate::SharedDb;

type TypingKey = (UserId, ChatId);

struct TypingTimer {
    token: u64,
    handle: JoinHandle<()>,
}

pub struct TypingTracker {
    db: SharedDb,
    sessions: Arc<Sessions>,
    timeout: Duration,
    timers: Arc<Mutex<HashMap<TypingKey, TypingTimer>>>,
    next_token: AtomicU64,
}

impl TypingTracker {
    pub fn new(db: SharedDb, sessions: Arc<Sessions>, timeout: Duration) -> Self {
        Self {
            db,
            sessions,
            timeout,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(0),
        }
    }

    /// Start or refresh the `(user, chat)` typing indicator.
    pub async fn set_typing(&self, user: UserId, chat_id: ChatId) -> Result<()> {
        let participants = self.participants_checked(user, chat_id).await?;
        let key = (user, chat_id);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        let mut timers = self.timers.lock().await;
        if let Some(prev) = timers.remove(&key) {
            prev.handle.abort();
        }

        self.sessions
            .send_to_users(
                &participants,
                &ServerEvent::UserTyping {
                    user_id: user,
                    chat_id,
                },
            )
            .await;

        let sessions = Arc::clone(&self.sessions);
        let timers_ref = Arc::clone(&self.timers);
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            {
                let mut timers = timers_ref.lock().await;
                match timers.get(&key) {
                    Some(timer) if timer.token == token => {
                        timers.remove(&key);
                    }
                    // Superseded by a refresh or an explicit stop.
                    _ => return,
                }
            }

            tracing::debug!(user = %user, chat = %chat_id, "typing indicator expired");
            sessions
                .send_to_users(
                    &participants,
                    &ServerEvent::UserStoppedTyping {
                        user_id: user,
                        chat_id,
                    },
                )
                .await;
        });

        timers.insert(key, TypingTimer { token, handle });
        Ok(())
    }

    /// Cancel the indicator and broadcast the stop immediately.
    pub async fn stop_typing(&self, user: UserId, chat_id: ChatId) -> Result<()> {
        let participants = self.participants_checked(user, chat_id).await?;

        if let Some(timer) = self.timers.lock().await.remove(&(user, chat_id)) {
            timer.handle.abort();
        }

        self.sessions
            .send_to_users(
                &participants,
                &ServerEvent::UserStoppedTyping {
                    user_id: user,
                    chat_id,
                },
            )
            .await;
        Ok(())
    }

    /// Release every indicator a user holds. Called when their last
    /// connection drops; live indicators emit their stop event so other
    /// participants don't see a typing ghost.
    pub async fn clear_user(&self, user: UserId) {
        let released: Vec<TypingKey> = {
            let mut timers = self.timers.lock().await;
            let keys: Vec<TypingKey> =
                timers.keys().copied().filter(|(u, _)| *u == user).collect();
            for key in &keys {
                if let Some(timer) = timers.remove(key) {
                    timer.handle.abort();
                }
            }
            keys
        };

        for (_, chat_id) in released {
            let participants = {
                let db = self.db.lock().await;
                match db.get_chat(chat_id) {
                    Ok(chat) => chat.participants,
                    Err(e) => {
                        tracing::warn!(chat = %chat_id, error = %e, "typing cleanup lookup failed");
                        continue;
                    }
                }
            };
            self.sessions
                .send_to_users(
                    &participants,
                    &ServerEvent::UserStoppedTyping {
                        user_id: user,
                        chat_id,
                    },
                )
                .await;
        }
    }

    async fn participants_checked(&self, user: UserId, chat_id: ChatId) -> Result<Vec<UserId>> {
        let db = self.db.lock().await;
        let chat = db.get_chat(chat_id).map_err(chat_not_found(chat_id))?;
        if !chat.participants.contains(&user) {
            return Err(CoreError::Forbidden);
        }
        Ok(chat.participants)
    }
}
