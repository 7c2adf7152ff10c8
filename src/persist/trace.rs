//! Recording persistence backend
//!
//! `PersistTrace` performs the same operations as [`CpuPersist`] and also
//! records each call, so the ordering of flushes and barriers issued by the
//! log can be checked after the fact.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::CACHE_LINE_BYTES;
use crate::persist::{CpuPersist, Persistence};
use crate::utility::align_down;

/// A single recorded durability operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistEvent {
    /// A cache line flush, as a byte offset of the line within the region.
    ///
    /// Lines outside the attached region are recorded with `usize::MAX`.
    Flush {
        /// Offset of the flushed line from the region base
        offset: usize,
    },
    /// A write fence
    Fence,
    /// A strong sync
    StrongSync,
}

#[derive(Debug, Default)]
struct TraceInner {
    base: AtomicUsize,
    len: AtomicUsize,
    events: Mutex<Vec<PersistEvent>>,
}

/// Persistence backend that records every call
///
/// Clones share the same event list.
#[derive(Debug, Clone, Default)]
pub struct PersistTrace {
    cpu: CpuPersist,
    inner: Arc<TraceInner>,
}

impl PersistTrace {
    /// Create an empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<PersistEvent> {
        self.inner.events.lock().clone()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.inner.events.lock().clear();
    }

    /// Number of strong syncs recorded so far
    pub fn strong_syncs(&self) -> usize {
        self.inner
            .events
            .lock()
            .iter()
            .filter(|e| matches!(e, PersistEvent::StrongSync))
            .count()
    }

    fn record(&self, event: PersistEvent) {
        self.inner.events.lock().push(event);
    }
}

impl Persistence for PersistTrace {
    fn flush_line<T: ?Sized>(&self, value: &T) {
        let addr = align_down(value as *const T as *const u8 as usize, CACHE_LINE_BYTES);
        let base = self.inner.base.load(Ordering::Acquire);
        let len = self.inner.len.load(Ordering::Acquire);
        let offset = if addr >= base && addr < base + len {
            addr - base
        } else {
            usize::MAX
        };
        self.cpu.flush_line(value);
        self.record(PersistEvent::Flush { offset });
    }

    fn fence(&self) {
        self.cpu.fence();
        self.record(PersistEvent::Fence);
    }

    fn strong_sync(&self) {
        self.cpu.strong_sync();
        self.record(PersistEvent::StrongSync);
    }

    fn attach(&self, base: *const u8, len: usize) {
        self.inner.len.store(len, Ordering::Release);
        self.inner.base.store(base as usize, Ordering::Release);
    }
}
