//! pmwal - A crash-consistent write-ahead log over a persistent region
//!
//! pmwal keeps a fixed-capacity circular log of pending writes in a
//! memory-mapped, cache-line-addressable region. Producers append small
//! writes (at most one cache line each) with explicit flush/fence ordering,
//! and a single background thread applies them to their target files and
//! periodically checkpoints its progress.
//!
//! # Features
//!
//! - Lock-free slot reservation for any number of producer threads
//! - Ordered durable commit of each entry (payload before commit flag)
//! - Two-tier tail: producers gate on the last *checkpointed* tail
//! - Recovery that replays at most the unapplied tail after a crash
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pmwal::log::{DurableLog, LogConfig};
//! use pmwal::target::{FileTarget, TargetTable};
//!
//! let mut targets = TargetTable::new();
//! let out = targets.register(FileTarget::open("out.dat", true)?);
//!
//! let config = LogConfig::new("nvmm.dat").with_capacity(1024);
//! let (log, report) = DurableLog::open(config, targets)?;
//! let log = Arc::new(log);
//! let worker = log.start_cleanup()?;
//!
//! log.append(out, b"hello", 0)?;
//!
//! let stats = worker.stop()?;
//! ```

#![warn(missing_docs)]

pub mod backoff;
pub mod config;
pub mod crash_point;
pub mod log;
pub mod persist;
pub mod region;
pub mod status;
pub mod target;
mod utility;

// Re-exports for convenience
pub use log::{DurableLog, LogConfig, LogError, LogErrorKind};
pub use status::Status;
pub use target::{TargetId, TargetTable};

/// Constants used throughout the library
pub mod constants {
    /// Size of a cache line in bytes
    pub const CACHE_LINE_BYTES: usize = 64;

    /// Largest payload a single log entry can carry
    pub const MAX_PAYLOAD_BYTES: usize = CACHE_LINE_BYTES;

    /// Default number of slots in the log
    pub const DEFAULT_CAPACITY: usize = 64 * 1024;

    /// Default number of attempts made to apply an entry to its target
    pub const DEFAULT_APPLY_RETRIES: u32 = 3;
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::backoff::BackoffPolicy;
    pub use crate::log::{CleanupStats, CleanupWorker, DurableLog, LogConfig, RecoveryReport};
    pub use crate::persist::{CpuPersist, Persistence};
    pub use crate::status::Status;
    pub use crate::target::{FileTarget, MemTarget, TargetDevice, TargetId, TargetTable};
}
