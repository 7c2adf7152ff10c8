//! Durable append log
//!
//! This module provides the write-ahead log itself: a fixed-capacity ring of
//! one-cache-line entries in a persistent region, drained by a background
//! cleanup thread.
//!
//! # Overview
//!
//! Each entry describes one small write (`payload` at `offset` in a target
//! file). `append` makes the entry durable and returns; the cleanup thread
//! applies it to the target later and checkpoints its progress in the
//! region. After a crash, [`DurableLog::open`] replays whatever was
//! committed but not yet covered by a checkpoint.
//!
//! # Key Features
//!
//! - **Lock-free append**: producers reserve slots with a CAS on `head`
//! - **Ordered commit**: payload and header are durable before the commit word
//! - **Bounded replay**: a checkpoint covers at most half the log
//! - **Idempotent recovery**: replays are absolute-offset overwrites
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pmwal::log::{DurableLog, LogConfig};
//! use pmwal::target::{MemTarget, TargetTable};
//!
//! let mut targets = TargetTable::new();
//! let out = targets.register(MemTarget::new());
//!
//! let (log, report) = DurableLog::open(LogConfig::new("wal.dat"), targets)?;
//! let log = Arc::new(log);
//! let worker = log.start_cleanup()?;
//!
//! log.append(out, b"hello", 0)?;
//! let stats = worker.stop()?;
//! ```

mod append;
mod cleanup;
mod durable_log;
pub mod inspect;
pub mod layout;
mod recovery;
mod types;

pub use cleanup::CleanupWorker;
pub use durable_log::DurableLog;
pub use inspect::{CommittedEntry, LogInspector, LogSnapshot};
pub use layout::LogLayout;
pub use types::{CleanupStats, LogConfig, LogError, LogErrorKind, LogStats, RecoveryReport};
