//! Shared types for the durable log.

use std::fmt;
use std::path::PathBuf;

use crate::backoff::BackoffPolicy;
use crate::constants::{DEFAULT_APPLY_RETRIES, DEFAULT_CAPACITY};
use crate::crash_point::CrashInjector;
use crate::log::layout::LogLayout;
use crate::status::Status;

/// Configuration for a durable log
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Backing file of the persistent region (`None` = anonymous mapping)
    pub path: Option<PathBuf>,
    /// Number of slots. At most `capacity - 1` entries are outstanding.
    pub capacity: usize,
    /// Extra attempts made when applying an entry to its target fails
    pub apply_retries: u32,
    /// Crash injection for the cleanup thread
    pub crash: CrashInjector,
    /// Wait policy for producers while the log is full
    pub reservation_backoff: BackoffPolicy,
    /// Wait policy for the cleanup thread while the log is empty
    pub idle_backoff: BackoffPolicy,
}

impl LogConfig {
    /// Create a configuration backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Create a configuration for an in-memory region
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Set the number of slots.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the number of apply retries.
    pub fn with_apply_retries(mut self, retries: u32) -> Self {
        self.apply_retries = retries;
        self
    }

    /// Set crash injection.
    pub fn with_crash(mut self, crash: CrashInjector) -> Self {
        self.crash = crash;
        self
    }

    /// Set the producer backoff policy.
    pub fn with_reservation_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.reservation_backoff = policy;
        self
    }

    /// Set the cleanup idle backoff policy.
    pub fn with_idle_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.idle_backoff = policy;
        self
    }

    /// Size of the persistent region this configuration needs
    pub fn region_size(&self) -> usize {
        LogLayout::new(self.capacity).region_size()
    }

    /// Check the configuration before opening a log.
    pub fn validate(&self) -> Result<(), LogError> {
        if self.capacity < 2 {
            return Err(LogError::new(
                LogErrorKind::Config,
                format!("capacity must be at least 2, got {}", self.capacity),
            ));
        }
        let fits = self
            .capacity
            .checked_mul(2 * crate::constants::CACHE_LINE_BYTES)
            .and_then(|bytes| bytes.checked_add(crate::constants::CACHE_LINE_BYTES))
            .is_some();
        if !fits {
            return Err(LogError::new(
                LogErrorKind::Config,
                format!("capacity {} overflows the region size", self.capacity),
            ));
        }
        Ok(())
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: DEFAULT_CAPACITY,
            apply_retries: DEFAULT_APPLY_RETRIES,
            crash: CrashInjector::disabled(),
            reservation_backoff: BackoffPolicy::Spin,
            idle_backoff: BackoffPolicy::Spin,
        }
    }
}

/// Detailed error information for log operations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LogError {
    /// Error category.
    pub kind: LogErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl LogError {
    pub(crate) fn new(kind: LogErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn io(context: impl fmt::Display, err: std::io::Error) -> Self {
        Self::new(LogErrorKind::Io, format!("{context}: {err}"))
    }

    /// Coarse status code for this error
    pub fn status(&self) -> Status {
        match self.kind {
            LogErrorKind::Io | LogErrorKind::Region => Status::IoError,
            LogErrorKind::Corruption => Status::Corruption,
            LogErrorKind::Config | LogErrorKind::Payload | LogErrorKind::Target => {
                Status::InvalidArgument
            }
            LogErrorKind::Full => Status::Full,
            LogErrorKind::Faulted => Status::Aborted,
            LogErrorKind::InvalidOperation => Status::InvalidOperation,
        }
    }
}

/// Error categories for log operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogErrorKind {
    /// Target I/O failures.
    Io,
    /// The persistent region could not be opened or has the wrong format.
    Region,
    /// Configuration or argument errors.
    Config,
    /// Payload larger than one cache line.
    Payload,
    /// Unknown target id.
    Target,
    /// No free slot (non-blocking append only).
    Full,
    /// The cleanup thread stopped on an unrecoverable error.
    Faulted,
    /// A committed slot holds values no append could have written.
    Corruption,
    /// Operation not allowed in the current state.
    InvalidOperation,
}

impl LogErrorKind {
    /// Short name of the category
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogErrorKind::Io => "io",
            LogErrorKind::Region => "region",
            LogErrorKind::Config => "config",
            LogErrorKind::Payload => "payload",
            LogErrorKind::Target => "target",
            LogErrorKind::Full => "full",
            LogErrorKind::Faulted => "faulted",
            LogErrorKind::Corruption => "corruption",
            LogErrorKind::InvalidOperation => "invalid operation",
        }
    }
}

impl fmt::Display for LogErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Committed entries reapplied to their targets
    pub replayed: usize,
    /// Slots examined
    pub scanned: usize,
    /// Durable tail found at the start of recovery
    pub start_tail: u64,
}

impl RecoveryReport {
    /// Whether the log held no committed entries
    pub fn was_clean(&self) -> bool {
        self.replayed == 0
    }
}

/// Totals reported by the cleanup thread when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Entries applied and released
    pub applied: u64,
    /// Checkpoints published
    pub checkpoints: u64,
    /// Largest number of entries covered by a single checkpoint
    pub largest_batch: usize,
    /// Whether the thread stopped on an injected crash
    pub crashed: bool,
}

impl CleanupStats {
    /// Average number of entries per checkpoint
    pub fn average_batch(&self) -> f64 {
        if self.checkpoints == 0 {
            0.0
        } else {
            self.applied as f64 / self.checkpoints as f64
        }
    }
}

impl fmt::Display for CleanupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied={} checkpoints={} largest_batch={} average_batch={:.1}",
            self.applied,
            self.checkpoints,
            self.largest_batch,
            self.average_batch()
        )
    }
}

/// Snapshot of the log's counters
#[derive(Debug, Clone)]
pub struct LogStats {
    /// Number of slots
    pub capacity: usize,
    /// Next slot handed to a producer
    pub head: usize,
    /// Last checkpointed tail, as seen by producers
    pub visible_tail: usize,
    /// Tail persisted in the control line
    pub durable_tail: u64,
    /// Reserved slots not yet covered by a checkpoint
    pub outstanding: usize,
    /// Appends completed since open
    pub appended: u64,
    /// Whether the cleanup thread has faulted
    pub faulted: bool,
}

impl fmt::Display for LogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Durable Log Statistics:")?;
        writeln!(f, "  Capacity: {} slots", self.capacity)?;
        writeln!(f, "  Head: {}", self.head)?;
        writeln!(f, "  Visible tail: {}", self.visible_tail)?;
        writeln!(f, "  Durable tail: {}", self.durable_tail)?;
        writeln!(f, "  Outstanding: {}", self.outstanding)?;
        writeln!(f, "  Appended: {}", self.appended)?;
        writeln!(f, "  Faulted: {}", self.faulted)
    }
}
