//! Rivulet - embedded durable event stream with consumer-group checkpointing
//!
//! A producer appends domain events to an append-only, crash-safe stream;
//! a background worker consumes them through a named consumer group and
//! persists each one to a document store, acknowledging after persist.
//! Delivery is at-least-once: entries delivered but not acknowledged
//! survive restarts in the group's pending list.
//!
//! # Quick Start
//!
//! ```ignore
//! use rivulet::{
//!     ChatEvent, DurabilityMode, JsonLinesStore, MessageRole, MessageWorker,
//!     Producer, StreamEngine, UserId, WorkerConfig, MESSAGE_STREAM,
//! };
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StreamEngine::open("data", DurabilityMode::default())?);
//! let store = Arc::new(JsonLinesStore::open("data/messages.jsonl")?);
//!
//! // Started once at process boot
//! let worker = MessageWorker::new(
//!     Arc::clone(&engine),
//!     Arc::clone(&store) as _,
//!     WorkerConfig::default(),
//! );
//! let handle = worker.spawn();
//!
//! // Request path appends and moves on; durability is the worker's job
//! let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
//! producer.enqueue(&ChatEvent::new(
//!     UserId::new("u1")?,
//!     "hello",
//!     MessageRole::User,
//! ))?;
//! ```

pub use rivulet_core::{
    ChatEvent, EntryId, Error, MessageRecord, MessageRole, PendingEntry, Result, StreamEntry,
    UserId,
};
pub use rivulet_store::{JsonLinesStore, MemoryStore, MessageStore};
pub use rivulet_stream::{DurabilityMode, GroupStatus, StreamEngine};
pub use rivulet_worker::{
    MessageWorker, Producer, WorkerConfig, WorkerHandle, WorkerStats, MESSAGE_CONSUMER,
    MESSAGE_GROUP, MESSAGE_STREAM,
};
