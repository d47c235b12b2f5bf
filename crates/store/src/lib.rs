//! Persistence sink for decoded chat events
//!
//! The sink is behind the `MessageStore` trait so the consumer worker can be
//! wired to any durable document store (and to test doubles). Two
//! implementations ship here: a durable JSON-lines file store and an
//! in-memory store for tests and ephemeral use.

mod jsonl;
mod memory;

pub use jsonl::JsonLinesStore;
pub use memory::MemoryStore;

use rivulet_core::error::Result;
use rivulet_core::event::{ChatEvent, MessageRecord, UserId};

/// Durable storage of decoded chat events
///
/// Records are immutable once written: the store assigns the id and
/// creation timestamp at insert time and never mutates a record afterward.
pub trait MessageStore: Send + Sync {
    /// Persist an event, returning the stored record
    fn insert(&self, event: &ChatEvent) -> Result<MessageRecord>;

    /// All records for a user, newest first
    fn messages_for_user(&self, user_id: &UserId) -> Result<Vec<MessageRecord>>;

    /// Total number of stored records
    fn len(&self) -> usize;

    /// Whether the store holds no records
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
