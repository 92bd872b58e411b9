use thiserror::Error;

use palaver_shared::types::{ChatId, MessageId};
use palaver_store::StoreError;

/// Errors produced by the coordination layer.
///
/// All of these are recoverable-and-local: they are caught at the
/// dispatch boundary, converted to an `error` event for the originating
/// connection, and the connection remains usable.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("User not found")]
    UserNotFound,

    #[error("Chat not found: {0}")]
    ChatNotFound(ChatId),

    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("Not a participant of this conversation")]
    Forbidden,

    #[error("Friend request already sent")]
    AlreadyRequested,

    #[error("Already friends")]
    AlreadyFriends,

    #[error("No pending friend request from {0}")]
    NoSuchRequest(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Connection has not joined")]
    Unauthenticated,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Map a store-level `NotFound` on a chat lookup to [`CoreError::ChatNotFound`].
pub(crate) fn chat_not_found(id: ChatId) -> impl FnOnce(StoreError) -> CoreError {
    move |e| match e {
        StoreError::NotFound => CoreError::ChatNotFound(id),
        other => CoreError::Store(other),
    }
}

/// Map a store-level `NotFound` on a message lookup to [`CoreError::MessageNotFound`].
pub(crate) fn message_not_found(id: MessageId) -> impl FnOnce(StoreError) -> CoreError {
    move |e| match e {
        StoreError::NotFound => CoreError::MessageNotFound(id),
        other => CoreError::Store(other),
    }
}

/// Map a store-level `NotFound` on a user lookup to [`CoreError::UserNotFound`].
pub(crate) fn user_not_found(e: StoreError) -> CoreError {
    match e {
        StoreError::NotFound => CoreError::UserNotFound,
        other => CoreError::Store(other),
    }
}
