//! Durability primitives
//!
//! The log never talks to the cache hierarchy directly. Every durable update
//! goes through a [`Persistence`] implementation which provides three
//! operations:
//!
//! - `flush_line`: push the cache line holding a value toward the durability
//!   domain. It does not order anything by itself.
//! - `fence`: previously issued flushes complete before any later store can
//!   become durable.
//! - `strong_sync`: the strongest barrier available; used for checkpoints.
//!
//! Any multi-field durable update follows the same pattern: write the fields,
//! flush every touched line, fence, then flip the single commit word, flush
//! its line and fence again.

mod cpu;
mod trace;

pub use cpu::CpuPersist;
pub use trace::{PersistEvent, PersistTrace};

/// Cache flush and barrier capability consumed by the log
pub trait Persistence: Send + Sync + 'static {
    /// Flush the cache line containing the start of `value`.
    fn flush_line<T: ?Sized>(&self, value: &T);

    /// Order previously issued flushes before subsequent stores.
    fn fence(&self);

    /// Strongest barrier: everything flushed so far is committed on return.
    fn strong_sync(&self);

    /// Called once with the mapped region the log lives in.
    ///
    /// Implementations that only issue CPU instructions can ignore it.
    fn attach(&self, _base: *const u8, _len: usize) {}
}
