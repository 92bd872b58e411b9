//! # palaver-core
//!
//! The session, presence and messaging coordination layer: maps live
//! connections to user identities, routes messages and reactions to the
//! connections subscribed to a conversation, arbitrates friend-request
//! state transitions, and maintains ephemeral typing indicators.
//!
//! The [`Database`] is the single source of truth for durable entities;
//! everything this crate keeps in memory (connection↔user bindings,
//! typing timers) is rebuildable from store reads plus live connection
//! state.
//!
//! [`Database`]: palaver_store::Database

pub mod directory;
pub mod engine;
pub mod friends;
pub mod keyed;
pub mod registry;
pub mod router;
pub mod session;
pub mod typing;

mod error;

pub use engine::{ChatCore, CoreConfig};
pub use error::{CoreError, Result};
pub use session::{ConnectionId, Sessions};

/// Shared handle to the directory store. A slow store call suspends only
/// the handler awaiting the lock, never the whole process.
pub type SharedDb = std::sync::Arc<tokio::sync::Mutex<palaver_store::Database>>;
