//! Producer side of the chat durability pipeline

use rivulet_core::error::{Error, Result};
use rivulet_core::event::ChatEvent;
use rivulet_core::types::EntryId;
use rivulet_stream::StreamEngine;
use std::sync::Arc;
use tracing::debug;

/// Appends chat events to a stream
///
/// Takes the engine handle explicitly so callers (and tests) decide which
/// engine a producer writes to.
pub struct Producer {
    engine: Arc<StreamEngine>,
    stream: String,
}

impl Producer {
    /// Create a producer appending to `stream`
    pub fn new(engine: Arc<StreamEngine>, stream: impl Into<String>) -> Self {
        Self {
            engine,
            stream: stream.into(),
        }
    }

    /// Append one event, returning the assigned entry id
    ///
    /// Encodes the event as the canonical ordered field list. Exactly one
    /// entry becomes visible to every consumer group on the stream. Fails
    /// with `Error::Append` when the log cannot be written.
    pub fn enqueue(&self, event: &ChatEvent) -> Result<EntryId> {
        let id = self
            .engine
            .append(&self.stream, event.to_fields())
            .map_err(|e| match e {
                Error::Shutdown => Error::Shutdown,
                other => Error::Append(other.to_string()),
            })?;
        debug!(stream = %self.stream, id = %id, role = %event.role, "enqueued chat event");
        Ok(id)
    }

    /// Stream this producer appends to
    pub fn stream(&self) -> &str {
        &self.stream
    }
}
