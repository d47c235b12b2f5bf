//! Core types for the rivulet event stream
//!
//! This module defines the foundational stream types:
//! - EntryId: monotonic identifier assigned to entries at append time
//! - StreamEntry: one immutable appended record with ordered field/value pairs
//! - PendingEntry: bookkeeping for a delivered-but-unacknowledged entry

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to a stream entry at append time
///
/// An EntryId is a pair of milliseconds-since-epoch and a per-millisecond
/// sequence counter. Ids are assigned by the log, strictly increase within
/// one stream, and are never reused. Comparison of ids defines the total
/// order of entries within a stream.
///
/// Rendered as `"<ms>-<seq>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId {
    /// Milliseconds since the Unix epoch at assignment time
    pub ms: u64,
    /// Sequence counter disambiguating entries within one millisecond
    pub seq: u64,
}

impl EntryId {
    /// Create an EntryId from its two components
    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Parse an id from its `"<ms>-<seq>"` string form
    ///
    /// Returns None if the string is not two dash-separated integers.
    pub fn from_string(s: &str) -> Option<Self> {
        let (ms, seq) = s.split_once('-')?;
        Some(Self {
            ms: ms.parse().ok()?,
            seq: seq.parse().ok()?,
        })
    }

    /// The id the log assigns to the entry appended after `last` at `now_ms`
    ///
    /// Ids must increase even when the wall clock stalls or steps backwards,
    /// so the sequence counter bumps whenever `now_ms` has not advanced past
    /// the previous id's millisecond.
    pub fn successor(last: Option<EntryId>, now_ms: u64) -> EntryId {
        match last {
            Some(prev) if now_ms <= prev.ms => EntryId::new(prev.ms, prev.seq + 1),
            _ => EntryId::new(now_ms, 0),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// One appended stream record
///
/// Entries are immutable once appended. Fields are an ordered list of
/// name/value pairs; the canonical write order is fixed by the producer,
/// but readers look fields up by name rather than position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Log-assigned identifier
    pub id: EntryId,
    /// Ordered field/value pairs
    pub fields: Vec<(String, String)>,
}

impl StreamEntry {
    /// Look up a field value by name
    ///
    /// Returns the first value for `name`, or None if absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A delivered-but-unacknowledged entry in a consumer group's pending list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Entry the delivery refers to
    pub id: EntryId,
    /// Consumer the entry was last delivered to
    pub consumer: String,
    /// Number of times the entry has been delivered
    pub delivery_count: u64,
    /// Milliseconds since epoch of the most recent delivery
    pub delivered_at_ms: u64,
}
