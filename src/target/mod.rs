//! Apply targets
//!
//! Entries in the log describe positional overwrites of ordinary files. The
//! cleanup thread and recovery apply them through the [`TargetDevice`]
//! trait. Targets are registered in a [`TargetTable`] before the log is
//! opened; each slot records the [`TargetId`] of the device it writes to.

mod file_target;
mod mem_target;
mod table;
mod traits;

pub use file_target::FileTarget;
pub use mem_target::MemTarget;
pub use table::{TargetId, TargetTable};
pub use traits::{write_all_at, TargetDevice};
