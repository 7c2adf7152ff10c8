//! Cleanup thread
//!
//! One background thread drains the log. It walks the slots from the durable
//! tail, applies each committed entry to its target (write, then sync), and
//! releases the slot by clearing its commit word. After at most
//! `capacity / 2` entries, or as soon as it runs out of committed entries,
//! it checkpoints: the cursor is persisted as the durable tail with a strong
//! sync, and only then published to producers through `visible_tail`.
//!
//! A slot therefore becomes reusable only once its release is covered by a
//! durable checkpoint, and recovery never replays more than the entries
//! past the last checkpoint.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::crash_point::CrashMode;
use crate::log::durable_log::DurableLog;
use crate::log::types::{CleanupStats, LogError, LogErrorKind};
use crate::persist::{CpuPersist, Persistence};

type CleanupResult = Result<CleanupStats, LogError>;

/// Handle to a running cleanup thread
///
/// Dropping the handle stops the thread and waits for it.
pub struct CleanupWorker<P: Persistence = CpuPersist> {
    log: Arc<DurableLog<P>>,
    worker: Mutex<Option<JoinHandle<CleanupResult>>>,
}

impl<P: Persistence> DurableLog<P> {
    /// Start the cleanup thread.
    ///
    /// Only one cleanup thread may run per log; a second call fails with
    /// [`LogErrorKind::InvalidOperation`] until the first one is stopped.
    pub fn start_cleanup(self: &Arc<Self>) -> Result<CleanupWorker<P>, LogError> {
        if self
            .cleanup_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LogError::new(
                LogErrorKind::InvalidOperation,
                "cleanup thread already running",
            ));
        }
        if self.is_faulted() {
            self.cleanup_running.store(false, Ordering::Release);
            return Err(self.fault_error());
        }
        self.stop.store(false, Ordering::Release);

        let log = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("pmwal-cleanup".to_string())
            .spawn(move || log.cleanup_loop())
            .map_err(|e| {
                self.cleanup_running.store(false, Ordering::Release);
                LogError::io("failed to spawn cleanup thread", e)
            })?;

        Ok(CleanupWorker {
            log: Arc::clone(self),
            worker: Mutex::new(Some(handle)),
        })
    }

    fn cleanup_loop(&self) -> CleanupResult {
        let batch_limit = (self.layout.capacity() / 2).max(1);
        let mut cursor = self.visible_tail.load(Ordering::Acquire);
        let mut batch = 0usize;
        let mut stats = CleanupStats::default();
        let waiter = self.config.idle_backoff.waiter();

        debug_assert_eq!(self.slot_index(cursor) as u64, self.control().tail());
        debug!(cursor, batch_limit, "cleanup thread started");

        loop {
            let index = self.slot_index(cursor);
            let slot = self.slot(index);

            if batch < batch_limit && slot.header.is_committed() {
                if self.config.crash.should_crash() {
                    return Ok(self.injected_crash(index, stats));
                }

                if let Err(err) = self.apply_with_retry(index) {
                    if batch > 0 {
                        self.checkpoint(cursor, batch, &mut stats);
                    }
                    error!(slot = index, error = %err, "cleanup thread giving up");
                    self.record_fault(err.clone());
                    return Err(err);
                }

                slot.header.clear_committed();
                self.persist.flush_line(&slot.header);
                self.persist.fence();

                cursor += 1;
                batch += 1;
                waiter.reset();
            } else if batch > 0 {
                self.checkpoint(cursor, batch, &mut stats);
                batch = 0;
            } else if self.stop.load(Ordering::Acquire) {
                // A commit that happened before the stop request may have
                // been missed by the first check.
                if slot.header.is_committed() {
                    continue;
                }
                info!(
                    applied = stats.applied,
                    checkpoints = stats.checkpoints,
                    largest_batch = stats.largest_batch,
                    "cleanup thread stopped"
                );
                return Ok(stats);
            } else {
                waiter.wait();
            }
        }
    }

    /// Apply the entry in slot `index` and sync its target, retrying I/O
    /// failures up to `apply_retries` times.
    fn apply_with_retry(&self, index: usize) -> Result<(), LogError> {
        let entry = self.read_entry(index)?;
        let device = self.device(entry.target)?;
        let attempts = self.config.apply_retries.saturating_add(1);
        let waiter = BackoffPolicy::Exponential.waiter();

        let mut attempt = 1;
        loop {
            let result = self.write_entry(&entry).and_then(|()| {
                device
                    .sync()
                    .map_err(|e| LogError::io(format!("sync of {}", entry.target), e))
            });

            match result {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts => {
                    warn!(
                        slot = index,
                        target = %entry.target,
                        attempt,
                        error = %err,
                        "apply failed, retrying"
                    );
                    attempt += 1;
                    waiter.wait();
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Persist `cursor` as the durable tail, then let producers see it.
    fn checkpoint(&self, cursor: u64, batch: usize, stats: &mut CleanupStats) {
        let control = self.control();
        let tail = self.slot_index(cursor) as u64;

        control.set_tail(tail);
        self.persist.flush_line(control);
        self.persist.strong_sync();
        self.visible_tail.store(cursor, Ordering::Release);

        stats.applied += batch as u64;
        stats.checkpoints += 1;
        stats.largest_batch = stats.largest_batch.max(batch);

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(tail, batch, "checkpoint");
        }
    }

    fn injected_crash(&self, index: usize, mut stats: CleanupStats) -> CleanupStats {
        let mode = self.config.crash.mode();
        warn!(slot = index, ?mode, "injected crash");
        match mode {
            CrashMode::Exit => std::process::exit(0),
            CrashMode::Halt => {
                self.record_fault(LogError::new(
                    LogErrorKind::Faulted,
                    "cleanup halted by an injected crash",
                ));
                stats.crashed = true;
                stats
            }
        }
    }
}

impl<P: Persistence> CleanupWorker<P> {
    /// The log this worker drains
    pub fn log(&self) -> &Arc<DurableLog<P>> {
        &self.log
    }

    /// Ask the thread to exit once no committed entry is left at its cursor.
    /// Does not wait.
    pub fn request_stop(&self) {
        self.log.stop.store(true, Ordering::Release);
    }

    /// Whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Stop the thread, wait for it and return its totals.
    ///
    /// Fails with [`LogErrorKind::Faulted`] if the thread stopped on an
    /// error, and with [`LogErrorKind::InvalidOperation`] if it was already
    /// stopped.
    pub fn stop(&self) -> CleanupResult {
        let Some(handle) = self.worker.lock().take() else {
            return Err(LogError::new(
                LogErrorKind::InvalidOperation,
                "cleanup thread already stopped",
            ));
        };

        self.request_stop();
        let joined = handle.join();
        self.log.cleanup_running.store(false, Ordering::Release);

        match joined {
            Ok(Ok(stats)) => Ok(stats),
            Ok(Err(_)) => Err(self.log.fault_error()),
            Err(_) => {
                let err = LogError::new(LogErrorKind::Faulted, "cleanup thread panicked");
                self.log.record_fault(err.clone());
                Err(err)
            }
        }
    }
}

impl<P: Persistence> Drop for CleanupWorker<P> {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            let _ = self.stop();
        }
    }
}

impl<P: Persistence> std::fmt::Debug for CleanupWorker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupWorker")
            .field("finished", &self.is_finished())
            .finish()
    }
}
