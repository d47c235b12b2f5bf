//! Durable JSON-lines message store
//!
//! One serde_json-encoded `MessageRecord` per line, fsynced on every
//! insert. The full file is replayed into an in-memory index on open, so
//! reads never touch disk. Suits the write-rarely/read-rarely volume of a
//! chat durability sink; not a general-purpose database.

use crate::MessageStore;
use chrono::Utc;
use parking_lot::Mutex;
use rivulet_core::error::{Error, Result};
use rivulet_core::event::{ChatEvent, MessageRecord, UserId};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// File-backed message store, one JSON record per line
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    writer: BufWriter<File>,
    // Insert order; created_at is monotonic within one store
    records: Vec<MessageRecord>,
}

impl JsonLinesStore {
    /// Open a store, replaying any existing records
    ///
    /// Creates parent directories if they don't exist. A truncated final
    /// line (crash mid-write) is skipped with a warning; a malformed
    /// complete line is corruption.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut records = Vec::new();
        let mut truncate_to = None;
        let mut need_newline = false;
        if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let mut offset = 0u64;
            for line in data.split_inclusive('\n') {
                let text = line.strip_suffix('\n');
                let complete = text.is_some();
                let text = text.unwrap_or(line);
                if !text.is_empty() {
                    match serde_json::from_str::<MessageRecord>(text) {
                        Ok(record) => {
                            records.push(record);
                            if !complete {
                                // The record landed but its newline did not;
                                // restore the framing before appending more
                                need_newline = true;
                            }
                        }
                        Err(e) if !complete => {
                            // Partial final line from a crash mid-insert
                            warn!(
                                path = %path.display(),
                                error = %e,
                                "dropping truncated record at store tail"
                            );
                            truncate_to = Some(offset);
                        }
                        Err(e) => {
                            return Err(Error::Corruption(format!(
                                "malformed record line: {}",
                                e
                            )));
                        }
                    }
                }
                offset += line.len() as u64;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if let Some(len) = truncate_to {
            file.set_len(len)?;
        }
        let mut writer = BufWriter::new(file);
        if need_newline {
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        info!(path = %path.display(), records = records.len(), "opened message store");

        Ok(Self {
            path,
            inner: Mutex::new(Inner { writer, records }),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageStore for JsonLinesStore {
    fn insert(&self, event: &ChatEvent) -> Result<MessageRecord> {
        let record = MessageRecord {
            id: Uuid::new_v4(),
            user_id: event.user_id.clone(),
            content: event.content.clone(),
            role: event.role,
            created_at: Utc::now(),
        };

        let line = serde_json::to_string(&record).map_err(|e| Error::Store(e.to_string()))?;

        let mut inner = self.inner.lock();
        let write = |w: &mut BufWriter<File>| -> std::io::Result<()> {
            w.write_all(line.as_bytes())?;
            w.write_all(b"\n")?;
            w.flush()?;
            w.get_mut().sync_all()
        };
        write(&mut inner.writer).map_err(|e| Error::Store(e.to_string()))?;

        inner.records.push(record.clone());
        Ok(record)
    }

    fn messages_for_user(&self, user_id: &UserId) -> Result<Vec<MessageRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .records
            .iter()
            .rev()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect())
    }

    fn len(&self) -> usize {
        self.inner.lock().records.len()
    }
}
