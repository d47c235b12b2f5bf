//! Core types for the rivulet event stream
//!
//! This crate defines the foundational vocabulary shared by every layer:
//! stream entry types, the chat domain event and its persisted record form,
//! and the error taxonomy.

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod types;

pub use error::{Error, Result};
pub use event::{ChatEvent, MessageRecord, MessageRole, UserId};
pub use event::{FIELD_CONTENT, FIELD_ROLE, FIELD_USER_ID};
pub use types::{EntryId, PendingEntry, StreamEntry};
