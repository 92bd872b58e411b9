//! # palaver-shared
//!
//! Types shared between the Palaver server crates: entity id newtypes,
//! the domain models that travel over the wire, and the JSON event
//! protocol spoken on the persistent client channel.

pub mod constants;
pub mod models;
pub mod protocol;
pub mod types;

pub use models::*;
pub use types::{ChatId, MessageId, UserId};
