//! Shared test utilities for crash consistency and fault injection tests.

#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use pmwal::crash_point::{CrashInjector, CrashMode};
use pmwal::log::{DurableLog, LogConfig, RecoveryReport};
use pmwal::target::{FileTarget, TargetDevice, TargetId, TargetTable};

/// A fault-injection wrapper around any `TargetDevice`.
///
/// Allows deterministic injection of:
/// - a number of failing writes
/// - a number of failing syncs
/// - permanent failure of every write
pub struct FaultInjectionTarget<T> {
    inner: T,
    /// Total number of write_at calls observed so far.
    write_count: AtomicU64,
    /// Upcoming writes that will return an I/O error.
    failing_writes: AtomicU64,
    /// Upcoming syncs that will return an I/O error.
    failing_syncs: AtomicU64,
    /// When true, every write fails.
    broken: AtomicBool,
}

impl<T: TargetDevice> FaultInjectionTarget<T> {
    /// Wrap an existing target for fault injection.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            write_count: AtomicU64::new(0),
            failing_writes: AtomicU64::new(0),
            failing_syncs: AtomicU64::new(0),
            broken: AtomicBool::new(false),
        }
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u64) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` syncs fail.
    pub fn fail_next_syncs(&self, n: u64) {
        self.failing_syncs.store(n, Ordering::SeqCst);
    }

    /// Make every write fail until `repair` is called.
    pub fn break_device(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Stop failing writes.
    pub fn repair(&self) {
        self.broken.store(false, Ordering::SeqCst);
        self.failing_writes.store(0, Ordering::SeqCst);
        self.failing_syncs.store(0, Ordering::SeqCst);
    }

    /// Return the total number of write_at calls observed.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    /// The wrapped target.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn take_one(counter: &AtomicU64) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<T: TargetDevice> TargetDevice for FaultInjectionTarget<T> {
    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let n = self.write_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.broken.load(Ordering::SeqCst) || Self::take_one(&self.failing_writes) {
            return Err(io::Error::other(format!(
                "injected write error at operation {n}"
            )));
        }
        self.inner.write_at(offset, buf)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read_at(offset, buf)
    }

    fn sync(&self) -> io::Result<()> {
        if Self::take_one(&self.failing_syncs) {
            return Err(io::Error::other("injected sync error"));
        }
        self.inner.sync()
    }

    fn size(&self) -> io::Result<u64> {
        self.inner.size()
    }
}

/// Open a file-backed log with a single file target.
pub fn open_file_log(
    log_path: &Path,
    out_path: &Path,
    capacity: usize,
) -> (DurableLog, RecoveryReport, TargetId) {
    open_file_log_with(log_path, out_path, LogConfig::new(log_path).with_capacity(capacity))
}

/// Open a file-backed log with a single file target and a custom config.
pub fn open_file_log_with(
    log_path: &Path,
    out_path: &Path,
    config: LogConfig,
) -> (DurableLog, RecoveryReport, TargetId) {
    assert_eq!(config.path.as_deref(), Some(log_path));
    let mut targets = TargetTable::new();
    let id = targets.register(FileTarget::open(out_path, true).expect("open target"));
    let (log, report) = DurableLog::open(config, targets).expect("open log");
    (log, report, id)
}

/// A config whose cleanup thread halts on the first committed entry it sees.
pub fn halting_config(log_path: &Path, capacity: usize) -> LogConfig {
    LogConfig::new(log_path)
        .with_capacity(capacity)
        .with_crash(CrashInjector::new(1, CrashMode::Halt))
}

/// Drop the log the way a crash would: no cleanup, no close.
pub fn crash(log: Arc<DurableLog>) {
    drop(log);
}

/// Read a whole file, or an empty vector if it does not exist.
pub fn read_file(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// File corruption utilities
// ---------------------------------------------------------------------------

/// Flip one bit at the given byte offset in a file.
pub fn corrupt_byte_at(path: &Path, offset: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut byte = [0u8];
    file.read_exact(&mut byte)?;
    byte[0] ^= 0x01;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&byte)?;
    file.sync_all()?;
    Ok(())
}

/// Write raw bytes at the given offset in a file.
pub fn write_bytes_at(path: &Path, offset: u64, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
