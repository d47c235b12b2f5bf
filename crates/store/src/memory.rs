//! In-memory message store
//!
//! Same contract as the durable stores, nothing on disk. Used in tests and
//! wherever durability of the sink itself is someone else's problem.

use crate::MessageStore;
use chrono::Utc;
use parking_lot::RwLock;
use rivulet_core::error::Result;
use rivulet_core::event::{ChatEvent, MessageRecord, UserId};
use uuid::Uuid;

/// Volatile message store backed by a Vec
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<MessageRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record in insert order
    pub fn all(&self) -> Vec<MessageRecord> {
        self.records.read().clone()
    }
}

impl MessageStore for MemoryStore {
    fn insert(&self, event: &ChatEvent) -> Result<MessageRecord> {
        let record = MessageRecord {
            id: Uuid::new_v4(),
            user_id: event.user_id.clone(),
            content: event.content.clone(),
            role: event.role,
            created_at: Utc::now(),
        };
        self.records.write().push(record.clone());
        Ok(record)
    }

    fn messages_for_user(&self, user_id: &UserId) -> Result<Vec<MessageRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect())
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}
