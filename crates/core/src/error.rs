//! Error types for the rivulet event stream
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for rivulet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the event stream and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error in the log codec
    #[error("Codec error: {0}")]
    Codec(String),

    /// Data corruption detected in the on-disk log
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Producer could not append to the log
    #[error("Append failed: {0}")]
    Append(String),

    /// Stream does not exist
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    /// Consumer group does not exist on the stream
    #[error("Consumer group {group:?} not found on stream {stream:?}")]
    GroupNotFound {
        /// Stream the group was looked up on
        stream: String,
        /// Group name that was not found
        group: String,
    },

    /// Stream entry could not be decoded into a domain event
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Persistence sink rejected or failed a write
    #[error("Store error: {0}")]
    Store(String),

    /// Engine has been shut down; blocked readers are unparked with this
    #[error("Stream engine shut down")]
    Shutdown,
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
