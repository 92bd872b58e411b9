//! # palaver-store
//!
//! The directory store: durable storage for users, chats and messages,
//! backed by SQLite. This crate is the single source of truth for all
//! persisted entities; the coordination layer keeps only rebuildable
//! in-memory indices on top of it.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every
//! domain model.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
