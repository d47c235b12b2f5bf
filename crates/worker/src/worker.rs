//! Background consumer worker
//!
//! One long-lived loop per (group, consumer) pair: block on the stream for
//! the next entry, decode it, persist it, acknowledge it, repeat. Strictly
//! sequential — the read for entry k+1 is only issued once entry k's
//! decode/persist/ack cycle has finished.
//!
//! ## Failure handling
//!
//! - Group setup failure at start is logged and non-fatal; the first read
//!   surfaces the problem again.
//! - A read failure backs off (`retry_backoff`, default 5 s) and re-reads.
//! - A decode failure is counted and logged, the poison entry is acked so
//!   it cannot wedge the pending list, and the loop moves on. One bad entry
//!   never blocks later ones.
//! - A persist failure backs off and retries the *same* entry; the entry
//!   stays pending until the store accepts it, preserving at-least-once.
//!
//! The loop never terminates on its own; `WorkerHandle::stop` (or engine
//! shutdown) ends it. The blocking read and the backoff sleep are both
//! interruptible, so stop takes effect promptly.

use crate::config::WorkerConfig;
use parking_lot::{Condvar, Mutex};
use rivulet_core::error::Error;
use rivulet_core::event::ChatEvent;
use rivulet_core::types::StreamEntry;
use rivulet_store::MessageStore;
use rivulet_stream::StreamEngine;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Counters exposed by a running worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStats {
    /// Entries successfully persisted and acknowledged
    pub persisted: u64,
    /// Entries dropped because they could not be decoded
    pub decode_failures: u64,
}

#[derive(Default)]
struct Shared {
    stop: Mutex<bool>,
    stop_signal: Condvar,
    persisted: AtomicU64,
    decode_failures: AtomicU64,
}

impl Shared {
    fn stopped(&self) -> bool {
        *self.stop.lock()
    }

    // Sleep for `d` unless stop is requested first
    fn interruptible_sleep(&self, d: Duration) {
        let mut stop = self.stop.lock();
        if !*stop {
            self.stop_signal.wait_for(&mut stop, d);
        }
    }
}

/// The message consumer worker
///
/// Constructed with explicit engine and store handles; call `spawn` to run
/// it on its own thread, or `run` to drive it on the current one.
pub struct MessageWorker {
    engine: Arc<StreamEngine>,
    store: Arc<dyn MessageStore>,
    config: WorkerConfig,
    shared: Arc<Shared>,
}

impl MessageWorker {
    /// Create a worker consuming `config.stream` into `store`
    pub fn new(
        engine: Arc<StreamEngine>,
        store: Arc<dyn MessageStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Snapshot of the worker's counters
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            persisted: self.shared.persisted.load(Ordering::Relaxed),
            decode_failures: self.shared.decode_failures.load(Ordering::Relaxed),
        }
    }

    /// Run the worker on a dedicated thread
    pub fn spawn(self) -> WorkerHandle {
        let shared = Arc::clone(&self.shared);
        let thread = std::thread::Builder::new()
            .name("rivulet-worker".to_string())
            .spawn(move || self.run())
            .expect("failed to spawn worker thread");
        WorkerHandle {
            shared,
            thread: Some(thread),
        }
    }

    /// Drive the consume loop until stopped or the engine shuts down
    pub fn run(&self) {
        let cfg = &self.config;
        info!(
            stream = %cfg.stream,
            group = %cfg.group,
            consumer = %cfg.consumer,
            "message worker starting"
        );

        // Non-fatal: the first read will surface a real problem again
        if let Err(e) = self.engine.ensure_group(&cfg.stream, &cfg.group) {
            warn!(error = %e, "consumer group setup failed, continuing");
        }

        // Reprocess deliveries a previous incarnation never acknowledged
        match self
            .engine
            .claim_pending(&cfg.stream, &cfg.group, &cfg.consumer)
        {
            Ok(entries) => {
                for entry in entries {
                    if self.shared.stopped() {
                        break;
                    }
                    self.process(entry);
                }
            }
            Err(e) => warn!(error = %e, "could not claim pending entries"),
        }

        while !self.shared.stopped() {
            let deadline = Instant::now() + cfg.read_timeout;
            match self
                .engine
                .read_group(&cfg.stream, &cfg.group, &cfg.consumer, Some(deadline))
            {
                Ok(Some(entry)) => self.process(entry),
                Ok(None) => {} // timeout slice elapsed; re-check stop and read again
                Err(Error::Shutdown) => {
                    info!("stream engine shut down, worker exiting");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "stream read failed, backing off");
                    self.shared.interruptible_sleep(cfg.retry_backoff);
                }
            }
        }

        info!("message worker stopped");
    }

    // Decode, persist, acknowledge one entry
    fn process(&self, entry: StreamEntry) {
        let cfg = &self.config;

        let event = match ChatEvent::from_fields(&entry.fields) {
            Ok(event) => event,
            Err(e) => {
                warn!(id = %entry.id, error = %e, "dropping undecodable entry");
                self.shared.decode_failures.fetch_add(1, Ordering::Relaxed);
                // Ack the poison entry so the pending list cannot grow
                // without bound on a producer bug
                if let Err(e) = self.engine.ack(&cfg.stream, &cfg.group, entry.id) {
                    warn!(id = %entry.id, error = %e, "ack of dropped entry failed");
                }
                return;
            }
        };

        loop {
            match self.store.insert(&event) {
                Ok(record) => {
                    if let Err(e) = self.engine.ack(&cfg.stream, &cfg.group, entry.id) {
                        warn!(id = %entry.id, error = %e, "ack after persist failed");
                    }
                    self.shared.persisted.fetch_add(1, Ordering::Relaxed);
                    debug!(id = %entry.id, record = %record.id, "persisted chat event");
                    return;
                }
                Err(e) => {
                    // The entry stays pending; retry it rather than move on
                    error!(id = %entry.id, error = %e, "persist failed, retrying after backoff");
                    self.shared.interruptible_sleep(cfg.retry_backoff);
                    if self.shared.stopped() {
                        return;
                    }
                }
            }
        }
    }
}

/// Handle to a spawned worker thread
pub struct WorkerHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Snapshot of the worker's counters
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            persisted: self.shared.persisted.load(Ordering::Relaxed),
            decode_failures: self.shared.decode_failures.load(Ordering::Relaxed),
        }
    }

    /// Request the worker to stop and wait for it to exit
    ///
    /// Idempotent; the worker finishes the entry it is processing (modulo
    /// persist retries) before exiting.
    pub fn stop(&mut self) {
        {
            let mut stop = self.shared.stop.lock();
            *stop = true;
            self.shared.stop_signal.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
