//! Friend request workflow.
//!
//! A per-user-pair state machine: no relation → pending (one direction
//! only) → friends. Accepting a request atomically resolves the pending
//! edges and creates the pair's conversation. The accept path is
//! serialized per unordered pair, so two near-simultaneous accepts
//! produce exactly one friendship and one chat.

use std::sync::Arc;

use palaver_shared::models::ChatSnapshot;
use palaver_shared::protocol::ServerEvent;
use palaver_shared::types::UserId;

use crate::directory::ChatDirectory;
use crate::error::{user_not_found, CoreError, Result};
use crate::keyed::KeyedLocks;
use crate::session::Sessions;
use crate::SharedDb;

pub struct FriendWorkflow {
    db: SharedDb,
    sessions: Arc<Sessions>,
    directory: Arc<ChatDirectory>,
    pair_locks: KeyedLocks<(UserId, UserId)>,
}

/// Canonical ordering of an unordered user pair, for lock keying.
fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl FriendWorkflow {
    pub fn new(db: SharedDb, sessions: Arc<Sessions>, directory: Arc<ChatDirectory>) -> Self {
        Self {
            db,
            sessions,
            directory,
            pair_locks: KeyedLocks::new(),
        }
    }

    /// Send a friend request to `to_username`, notifying the target's
    /// live connections.
    pub async fn send_request(&self, from: UserId, to_username: &str) -> Result<()> {
        let (from_user, target) = {
            let db = self.db.lock().await;
            let from_user = db.get_user(from).map_err(user_not_found)?;
            let target = db
                .find_user_by_username(to_username)?
                .ok_or(CoreError::UserNotFound)?;
            (from_user, target)
        };

        if target.id == from {
            return Err(CoreError::InvalidInput(
                "cannot send a friend request to yourself".into(),
            ));
        }

        let _guard = self.pair_locks.acquire(pair_key(from, target.id)).await;

        {
            let db = self.db.lock().await;
            if db.are_friends(from, target.id)? {
                return Err(CoreError::AlreadyFriends);
            }
            // A pair is never pending in both directions: a crossed
            // request is reported as already-requested, not recorded.
            if db.has_friend_request(from, target.id)?
                || db.has_friend_request(target.id, from)?
            {
                return Err(CoreError::AlreadyRequested);
            }
            db.create_friend_request(from, target.id)?;
        }

        tracing::info!(from = %from_user.username, to = %target.username, "friend request sent");
        self.sessions
            .send_to_user(
                target.id,
                &ServerEvent::FriendRequest {
                    from: from_user.username,
                },
            )
            .await;
        Ok(())
    }

    /// Accept the pending request from `requester_username`.
    ///
    /// On success the requester's connections receive
    /// `friendRequestAccepted` and the accepter's receive `newChat`, both
    /// carrying the (idempotently created) conversation.
    pub async fn accept_request(
        &self,
        accepter: UserId,
        requester_username: &str,
    ) -> Result<ChatSnapshot> {
        let (accepter_user, requester) = {
            let db = self.db.lock().await;
            let accepter_user = db.get_user(accepter).map_err(user_not_found)?;
            let requester = db
                .find_user_by_username(requester_username)?
                .ok_or(CoreError::UserNotFound)?;
            (accepter_user, requester)
        };

        let _guard = self
            .pair_locks
            .acquire(pair_key(accepter, requester.id))
            .await;

        let accepted = {
            let mut db = self.db.lock().await;
            db.accept_friend_request(accepter, requester.id)?
        };
        if !accepted {
            // Withdrawn, never sent, or already resolved by a concurrent
            // accept: an error event, not a crash.
            return Err(CoreError::NoSuchRequest(requester_username.to_string()));
        }

        let chat = self.directory.create_chat(&[accepter, requester.id]).await?;

        tracing::info!(
            accepter = %accepter_user.username,
            requester = %requester.username,
            chat = %chat.id,
            "friend request accepted"
        );

        self.sessions
            .send_to_user(
                requester.id,
                &ServerEvent::FriendRequestAccepted {
                    username: accepter_user.username.clone(),
                    chat: chat.clone(),
                },
            )
            .await;
        self.sessions
            .send_to_user(accepter, &ServerEvent::NewChat { chat: chat.clone() })
            .await;

        Ok(chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_store::Database;
    use tokio::sync::Mutex;

    struct Fixture {
        workflow: Arc<FriendWorkflow>,
        db: SharedDb,
        alice: UserId,
        bob: UserId,
    }

    fn fixture() -> Fixture {
        let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let sessions = Arc::new(Sessions::new());
        let directory = Arc::new(ChatDirectory::new(Arc::clone(&db)));
        let workflow = Arc::new(FriendWorkflow::new(
            Arc::clone(&db),
            sessions,
            directory,
        ));

        let (alice, bob) = {
            let guard = db.try_lock().unwrap();
            (
                guard.create_user("alice").unwrap().id,
                guard.create_user("bob").unwrap().id,
            )
        };

        Fixture {
            workflow,
            db,
            alice,
            bob,
        }
    }

    #[tokio::test]
    async fn request_then_accept_creates_friendship_and_chat() {
        let f = fixture();

        f.workflow.send_request(f.alice, "bob").await.unwrap();
        let chat = f.workflow.accept_request(f.bob, "alice").await.unwrap();

        assert_eq!(chat.participants.len(), 2);
        let db = f.db.lock().await;
        assert!(db.are_friends(f.alice, f.bob).unwrap());
    }

    #[tokio::test]
    async fn duplicate_and_reverse_requests_are_rejected() {
        let f = fixture();

        f.workflow.send_request(f.alice, "bob").await.unwrap();
        assert!(matches!(
            f.workflow.send_request(f.alice, "bob").await,
            Err(CoreError::AlreadyRequested)
        ));
        assert!(matches!(
            f.workflow.send_request(f.bob, "alice").await,
            Err(CoreError::AlreadyRequested)
        ));
    }

    #[tokio::test]
    async fn request_after_friendship_is_rejected() {
        let f = fixture();

        f.workflow.send_request(f.alice, "bob").await.unwrap();
        f.workflow.accept_request(f.bob, "alice").await.unwrap();

        assert!(matches!(
            f.workflow.send_request(f.alice, "bob").await,
            Err(CoreError::AlreadyFriends)
        ));
    }

    #[tokio::test]
    async fn unknown_target_and_missing_request() {
        let f = fixture();

        assert!(matches!(
            f.workflow.send_request(f.alice, "carol").await,
            Err(CoreError::UserNotFound)
        ));
        assert!(matches!(
            f.workflow.accept_request(f.bob, "alice").await,
            Err(CoreError::NoSuchRequest(_))
        ));
    }

    #[tokio::test]
    async fn self_request_is_invalid() {
        let f = fixture();
        assert!(matches!(
            f.workflow.send_request(f.alice, "alice").await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_accepts_yield_one_chat() {
        let f = fixture();
        f.workflow.send_request(f.alice, "bob").await.unwrap();

        let w1 = Arc::clone(&f.workflow);
        let w2 = Arc::clone(&f.workflow);
        let bob = f.bob;
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { w1.accept_request(bob, "alice").await }),
            tokio::spawn(async move { w2.accept_request(bob, "alice").await }),
        );

        let results = [r1.unwrap(), r2.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1, "exactly one accept succeeds");
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(CoreError::NoSuchRequest(_)))));

        // Exactly one chat exists for the pair either way.
        let chat = f.workflow.directory.create_chat(&[f.alice, bob]).await.unwrap();
        let db = f.db.lock().await;
        assert!(db.is_participant(chat.id, f.alice).unwrap());
    }
}
