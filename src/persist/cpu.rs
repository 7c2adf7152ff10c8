//! CPU cache-line flush implementation

use std::sync::atomic::{compiler_fence, fence, Ordering};

use crate::persist::Persistence;

/// Durability primitives backed by CPU instructions
///
/// On x86_64 this issues `clflush`, `sfence` and `mfence`. Other targets fall
/// back to sequentially consistent fences, which keep the ordering contract
/// for in-process use but cannot force lines out of the cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuPersist;

impl CpuPersist {
    /// Create a new CPU persistence backend
    pub const fn new() -> Self {
        Self
    }
}

impl Persistence for CpuPersist {
    #[inline]
    fn flush_line<T: ?Sized>(&self, value: &T) {
        let addr = value as *const T as *const u8;
        // Stores to the line must be emitted before the flush.
        compiler_fence(Ordering::SeqCst);

        #[cfg(target_arch = "x86_64")]
        // SAFETY: `addr` is derived from a live reference, so the line is mapped.
        unsafe {
            std::arch::x86_64::_mm_clflush(addr);
        }

        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = addr;
            fence(Ordering::SeqCst);
        }
    }

    #[inline]
    fn fence(&self) {
        #[cfg(target_arch = "x86_64")]
        #[allow(unused_unsafe)]
        // SAFETY: SSE is part of the x86_64 baseline.
        unsafe {
            std::arch::x86_64::_mm_sfence();
        }
        fence(Ordering::SeqCst);
    }

    #[inline]
    fn strong_sync(&self) {
        #[cfg(target_arch = "x86_64")]
        #[allow(unused_unsafe)]
        // SAFETY: SSE2 is part of the x86_64 baseline.
        unsafe {
            std::arch::x86_64::_mm_mfence();
        }
        fence(Ordering::SeqCst);
    }
}
