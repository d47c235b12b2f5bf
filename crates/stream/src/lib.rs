//! Durable log engine for the rivulet event stream
//!
//! Layers, bottom up:
//! - `encoding` — the on-disk record codec (length-framed, CRC-checked)
//! - `log_file` — the append-only file the codec writes to
//! - `engine` — streams, consumer groups, blocking reads, acknowledgment

pub mod encoding;
pub mod engine;
pub mod log_file;

pub use encoding::LogRecord;
pub use engine::{GroupStatus, StreamEngine};
pub use log_file::{DurabilityMode, LogFile};
