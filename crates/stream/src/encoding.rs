//! Log record encoding and decoding
//!
//! This module provides encoding/decoding for log records with CRC32
//! checksums for corruption detection.
//!
//! ## Record Format
//!
//! ```text
//! [length: u32][type: u8][payload: bytes][crc32: u32]
//! ```
//!
//! - **length**: Total size of type + payload + crc (NOT including length itself)
//! - **type**: Record type tag (1=Append, 2=GroupCreate, 3=Deliver, 4=Ack)
//! - **payload**: bincode-serialized LogRecord
//! - **crc32**: CRC32 checksum over \[type\]\[payload\]
//!
//! Length framing enables variable-sized records, the type tag enables
//! forward compatibility, and the CRC detects bit flips and partial writes.
//! A truncated record at the tail of the file is an expected artifact of a
//! crash mid-write and terminates decoding cleanly; a checksum mismatch on
//! a complete record is corruption and is reported as an error.

use crc32fast::Hasher;
use rivulet_core::error::{Error, Result};
use rivulet_core::types::{EntryId, StreamEntry};
use serde::{Deserialize, Serialize};
use std::io::Read;

const TYPE_APPEND: u8 = 1;
const TYPE_GROUP_CREATE: u8 = 2;
const TYPE_DELIVER: u8 = 3;
const TYPE_ACK: u8 = 4;

// Complete records larger than this are treated as corruption rather than
// attempting a multi-gigabyte allocation from a damaged length prefix.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// State-changing operations recorded in the append-only log
///
/// Replaying these records in order reconstructs every stream, every group
/// cursor, and every pending-entries list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    /// A new entry was appended to a stream
    Append {
        /// Stream appended to
        stream: String,
        /// The appended entry, id included
        entry: StreamEntry,
    },

    /// A consumer group was created on a stream
    ///
    /// Creates the stream as well when it did not exist yet, so consumption
    /// can start before any producer has appended.
    GroupCreate {
        /// Stream the group lives on
        stream: String,
        /// Group name
        group: String,
    },

    /// An entry was delivered to a consumer within a group
    ///
    /// Advances the group cursor to `id` and adds (or re-counts) the entry
    /// in the pending-entries list.
    Deliver {
        /// Stream read from
        stream: String,
        /// Group the delivery belongs to
        group: String,
        /// Delivered entry id
        id: EntryId,
        /// Consumer the entry was handed to
        consumer: String,
        /// Milliseconds since epoch of the delivery
        delivered_at_ms: u64,
    },

    /// A delivered entry was acknowledged after successful persistence
    ///
    /// Removes the entry from the group's pending-entries list.
    Ack {
        /// Stream the entry belongs to
        stream: String,
        /// Group acknowledging
        group: String,
        /// Acknowledged entry id
        id: EntryId,
    },
}

fn type_tag(record: &LogRecord) -> u8 {
    match record {
        LogRecord::Append { .. } => TYPE_APPEND,
        LogRecord::GroupCreate { .. } => TYPE_GROUP_CREATE,
        LogRecord::Deliver { .. } => TYPE_DELIVER,
        LogRecord::Ack { .. } => TYPE_ACK,
    }
}

/// Encode a log record to bytes ready for file I/O
///
/// Format: `[length: u32][type: u8][payload: bytes][crc32: u32]`
pub fn encode_record(record: &LogRecord) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)?;
    let total_len = 1 + payload.len() + 4;

    let mut buf = Vec::with_capacity(4 + total_len);
    buf.extend_from_slice(&(total_len as u32).to_le_bytes());
    buf.push(type_tag(record));
    buf.extend_from_slice(&payload);

    let mut hasher = Hasher::new();
    hasher.update(&buf[4..]);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());

    Ok(buf)
}

enum Fill {
    Full,
    Eof,
    Truncated,
}

// Read exactly buf.len() bytes, distinguishing clean EOF (zero bytes read)
// from a truncated record (some bytes read, then EOF).
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<Fill> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..])? {
            0 => {
                return Ok(if read == 0 { Fill::Eof } else { Fill::Truncated });
            }
            n => read += n,
        }
    }
    Ok(Fill::Full)
}

/// Decode the next record from a reader
///
/// Returns `Ok(None)` at end of file, including when the final record is
/// truncated (partial write at crash time). Returns `Err(Corruption)` for a
/// checksum mismatch or an unknown type tag on a complete record.
pub fn decode_record<R: Read>(reader: &mut R) -> Result<Option<LogRecord>> {
    let mut len_buf = [0u8; 4];
    match fill(reader, &mut len_buf)? {
        Fill::Eof => return Ok(None),
        Fill::Truncated => {
            tracing::warn!("truncated length prefix at log tail, stopping replay");
            return Ok(None);
        }
        Fill::Full => {}
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len < 5 || len > MAX_RECORD_LEN {
        return Err(Error::Corruption(format!(
            "implausible record length {}",
            len
        )));
    }

    let mut buf = vec![0u8; len];
    match fill(reader, &mut buf)? {
        Fill::Full => {}
        Fill::Eof | Fill::Truncated => {
            tracing::warn!("truncated record at log tail, stopping replay");
            return Ok(None);
        }
    }

    let body = &buf[..len - 4];
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&buf[len - 4..]);
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(body);
    if hasher.finalize() != stored_crc {
        return Err(Error::Corruption("record checksum mismatch".to_string()));
    }

    let tag = body[0];
    if !(TYPE_APPEND..=TYPE_ACK).contains(&tag) {
        return Err(Error::Corruption(format!("unknown record type {}", tag)));
    }

    let record: LogRecord = bincode::deserialize(&body[1..])?;
    Ok(Some(record))
}
