//! Append-only log file with configurable durability
//!
//! The log file is the single source of durable truth for the stream
//! engine: every append, group creation, delivery, and acknowledgment is
//! written here before it is visible in memory. Replaying the file from the
//! start reconstructs the full engine state.
//!
//! ## Durability Modes
//!
//! - `Strict` - fsync after every record (slow, maximum durability)
//! - `Batched` - fsync every N records OR T ms (DEFAULT, good balance)

use crate::encoding::{decode_record, encode_record, LogRecord};
use parking_lot::Mutex;
use rivulet_core::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

/// Durability mode configuration
///
/// Controls when fsync is called to ensure data reaches disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurabilityMode {
    /// fsync after every record (slow, maximum durability)
    Strict,

    /// fsync every N records OR every T milliseconds
    ///
    /// Good balance of speed and safety. May lose up to `batch_size`
    /// records or `interval_ms` of data on crash.
    Batched {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum records between fsyncs
        batch_size: usize,
    },
}

impl Default for DurabilityMode {
    fn default() -> Self {
        DurabilityMode::Batched {
            interval_ms: 100,
            batch_size: 1000,
        }
    }
}

/// Append-only log of encoded records persisted to disk
///
/// Appends take `&self`; the writer is guarded internally so the engine can
/// share one handle across producer and consumer paths.
pub struct LogFile {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    offset: AtomicU64,
    mode: DurabilityMode,
    last_fsync: Mutex<Instant>,
    writes_since_fsync: AtomicU64,
    #[cfg(test)]
    fail_appends: AtomicU64,
}

impl LogFile {
    /// Open an existing log file or create a new one
    ///
    /// Creates parent directories if they don't exist. The file is opened
    /// in append mode; existing content is preserved.
    pub fn open<P: AsRef<Path>>(path: P, mode: DurabilityMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let offset = AtomicU64::new(file.metadata()?.len());

        debug!(path = %path.display(), "opened log file");

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            offset,
            mode,
            last_fsync: Mutex::new(Instant::now()),
            writes_since_fsync: AtomicU64::new(0),
            #[cfg(test)]
            fail_appends: AtomicU64::new(0),
        })
    }

    // Make the next `n` appends fail with an I/O error, leaving the file
    // untouched. Lets tests exercise the write-failure paths.
    #[cfg(test)]
    pub(crate) fn fail_next_appends(&self, n: u64) {
        self.fail_appends.store(n, Ordering::SeqCst);
    }

    /// Append a record, returning the offset it was written at
    ///
    /// fsync behavior follows the configured durability mode.
    pub fn append(&self, record: &LogRecord) -> Result<u64> {
        #[cfg(test)]
        if self
            .fail_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected append failure",
            )
            .into());
        }

        let encoded = encode_record(record)?;

        // Offset is read and advanced under the writer lock so concurrent
        // appenders each see the offset their own record landed at
        let offset = {
            let mut writer = self.writer.lock();
            let offset = self.offset.load(Ordering::SeqCst);
            writer.write_all(&encoded)?;
            self.offset
                .fetch_add(encoded.len() as u64, Ordering::SeqCst);
            offset
        };

        match self.mode {
            DurabilityMode::Strict => self.fsync()?,
            DurabilityMode::Batched {
                interval_ms,
                batch_size,
            } => {
                let writes = self.writes_since_fsync.fetch_add(1, Ordering::SeqCst) + 1;
                let due = {
                    let last = self.last_fsync.lock();
                    last.elapsed().as_millis() as u64 >= interval_ms
                        || writes >= batch_size as u64
                };
                if due {
                    self.fsync()?;
                    self.writes_since_fsync.store(0, Ordering::SeqCst);
                    *self.last_fsync.lock() = Instant::now();
                } else {
                    // Keep writes visible to readers even between fsyncs
                    self.flush()?;
                }
            }
        }

        Ok(offset)
    }

    /// Flush buffered writes to OS buffers
    ///
    /// This does not guarantee the data reached disk; use `fsync` for that.
    pub fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        Ok(())
    }

    /// Force sync to disk (flush + fsync)
    pub fn fsync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        writer.get_mut().sync_all()?;
        Ok(())
    }

    /// Read every record from the beginning of the file
    ///
    /// A truncated record at the tail is ignored (partial write at crash
    /// time); mid-file corruption is surfaced as an error.
    pub fn read_all(&self) -> Result<Vec<LogRecord>> {
        self.flush()?;

        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        while let Some(record) = decode_record(&mut reader)? {
            records.push(record);
        }
        Ok(records)
    }

    /// Current file size in bytes
    pub fn size(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }
}

impl Drop for LogFile {
    fn drop(&mut self) {
        // Best effort; shutdown paths call fsync explicitly
        let _ = self.fsync();
    }
}
