//! Producer and consumer worker for the chat durability pipeline
//!
//! The producer appends chat events to the stream; the worker consumes them
//! through a named consumer group and persists each one to a `MessageStore`,
//! acknowledging after persist.

pub mod config;
pub mod producer;
pub mod worker;

pub use config::{WorkerConfig, MESSAGE_CONSUMER, MESSAGE_GROUP, MESSAGE_STREAM};
pub use producer::Producer;
pub use worker::{MessageWorker, WorkerHandle, WorkerStats};
