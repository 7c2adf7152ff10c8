//! Region layout of the durable log
//!
//! ```text
//! offset 0            slot[0] header   (one cache line)
//! offset 64           slot[0] payload  (one cache line)
//! ...
//! offset N * 128      control line     (durable tail + format stamp)
//! ```
//!
//! Every structure here is addressed by index into the mapped region. No
//! pointers are ever stored in the region, since its base address changes
//! from one mapping to the next.

use std::cell::UnsafeCell;
use std::mem::{align_of, offset_of, size_of};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};

use crate::constants::{CACHE_LINE_BYTES, MAX_PAYLOAD_BYTES};

const FREE: u32 = 0;
const COMMITTED: u32 = 1;

/// Metadata line of a slot
///
/// The commit word is a full `u32` rather than a `bool` so that any value
/// read back from a mapped file is a valid bit pattern. Zero means free.
#[repr(C, align(64))]
pub struct SlotHeader {
    committed: AtomicU32,
    target: AtomicU32,
    length: AtomicU32,
    _reserved: AtomicU32,
    offset: AtomicU64,
}

impl SlotHeader {
    /// Whether the slot holds a committed, not yet applied entry
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire) != FREE
    }

    #[inline]
    pub(crate) fn mark_committed(&self) {
        self.committed.store(COMMITTED, Ordering::Release);
    }

    #[inline]
    pub(crate) fn clear_committed(&self) {
        self.committed.store(FREE, Ordering::Release);
    }

    /// Store target, length and offset. The commit word is left untouched.
    #[inline]
    pub(crate) fn store_fields(&self, target: u32, length: u32, offset: u64) {
        self.target.store(target, Ordering::Relaxed);
        self.length.store(length, Ordering::Relaxed);
        self.offset.store(offset, Ordering::Relaxed);
    }

    /// Raw target id
    #[inline]
    pub fn target(&self) -> u32 {
        self.target.load(Ordering::Relaxed)
    }

    /// Payload length in bytes
    #[inline]
    pub fn length(&self) -> u32 {
        self.length.load(Ordering::Relaxed)
    }

    /// Absolute offset in the target
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Relaxed)
    }
}

/// Payload line of a slot
#[repr(C, align(64))]
pub struct SlotPayload {
    bytes: UnsafeCell<[u8; MAX_PAYLOAD_BYTES]>,
}

impl SlotPayload {
    /// Overwrite the whole line with `data` followed by zeros.
    ///
    /// # Safety
    /// The caller must own the slot: it was reserved by this thread and is
    /// not committed, so no other thread reads or writes the payload.
    #[inline]
    pub(crate) unsafe fn write(&self, data: &[u8]) {
        debug_assert!(data.len() <= MAX_PAYLOAD_BYTES);
        let mut line = [0u8; MAX_PAYLOAD_BYTES];
        line[..data.len()].copy_from_slice(data);
        // SAFETY: exclusive access is guaranteed by the caller.
        unsafe { self.bytes.get().write(line) };
    }

    /// Copy the line out.
    ///
    /// # Safety
    /// The caller must have observed the slot as committed (with acquire
    /// ordering) or otherwise exclude concurrent writers.
    #[inline]
    pub(crate) unsafe fn read(&self) -> [u8; MAX_PAYLOAD_BYTES] {
        // SAFETY: no writer is active per the caller's contract.
        unsafe { self.bytes.get().read() }
    }
}

/// One log entry: metadata and payload on separate cache lines
#[repr(C)]
pub struct Slot {
    /// Metadata line
    pub header: SlotHeader,
    /// Payload line
    pub payload: SlotPayload,
}

/// Control line holding the durable tail and the format stamp
#[repr(C, align(64))]
pub struct LogControl {
    tail: AtomicU64,
    magic: AtomicU64,
    capacity: AtomicU64,
    version: AtomicU32,
    _reserved: AtomicU32,
}

impl LogControl {
    /// Format magic, `PMWAL\0\0\x01`
    pub const MAGIC: u64 = u64::from_le_bytes(*b"PMWAL\0\0\x01");
    /// Format version
    pub const VERSION: u32 = 1;

    /// Durable tail as a slot index
    #[inline]
    pub fn tail(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_tail(&self, tail: u64) {
        self.tail.store(tail, Ordering::Release);
    }

    /// Stored magic (zero for a fresh region)
    pub fn magic(&self) -> u64 {
        self.magic.load(Ordering::Acquire)
    }

    /// Stored capacity
    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Acquire)
    }

    /// Stored format version
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// Stamp a fresh control line. Magic goes last.
    pub(crate) fn stamp(&self, capacity: u64) {
        self.tail.store(0, Ordering::Relaxed);
        self.capacity.store(capacity, Ordering::Relaxed);
        self.version.store(Self::VERSION, Ordering::Relaxed);
        self.magic.store(Self::MAGIC, Ordering::Release);
    }
}

const _: () = {
    assert!(size_of::<SlotHeader>() == CACHE_LINE_BYTES);
    assert!(size_of::<SlotPayload>() == CACHE_LINE_BYTES);
    assert!(size_of::<Slot>() == 2 * CACHE_LINE_BYTES);
    assert!(align_of::<Slot>() == CACHE_LINE_BYTES);
    assert!(offset_of!(Slot, payload) == CACHE_LINE_BYTES);
    assert!(size_of::<LogControl>() == CACHE_LINE_BYTES);
};

/// Plain-data image of a [`SlotHeader`], for reading a region offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SlotHeaderImage {
    /// Commit word
    pub committed: u32,
    /// Raw target id
    pub target: u32,
    /// Payload length
    pub length: u32,
    /// Reserved
    pub reserved: u32,
    /// Target offset
    pub offset: u64,
    /// Padding to the end of the line
    pub padding: [u64; 5],
}

impl SlotHeaderImage {
    /// Whether the image has its commit word set
    pub fn is_committed(&self) -> bool {
        self.committed != FREE
    }
}

/// Plain-data image of a [`LogControl`], for reading a region offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct LogControlImage {
    /// Durable tail
    pub tail: u64,
    /// Format magic
    pub magic: u64,
    /// Capacity in slots
    pub capacity: u64,
    /// Format version
    pub version: u32,
    /// Reserved
    pub reserved: u32,
    /// Padding to the end of the line
    pub padding: [u64; 4],
}

const _: () = {
    assert!(size_of::<SlotHeaderImage>() == CACHE_LINE_BYTES);
    assert!(offset_of!(SlotHeaderImage, committed) == offset_of!(SlotHeader, committed));
    assert!(offset_of!(SlotHeaderImage, target) == offset_of!(SlotHeader, target));
    assert!(offset_of!(SlotHeaderImage, length) == offset_of!(SlotHeader, length));
    assert!(offset_of!(SlotHeaderImage, offset) == offset_of!(SlotHeader, offset));
    assert!(size_of::<LogControlImage>() == CACHE_LINE_BYTES);
    assert!(offset_of!(LogControlImage, tail) == offset_of!(LogControl, tail));
    assert!(offset_of!(LogControlImage, magic) == offset_of!(LogControl, magic));
    assert!(offset_of!(LogControlImage, capacity) == offset_of!(LogControl, capacity));
    assert!(offset_of!(LogControlImage, version) == offset_of!(LogControl, version));
};

/// Byte offsets of the structures in a region of a given capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLayout {
    capacity: usize,
}

impl LogLayout {
    /// Layout for `capacity` slots
    pub const fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Number of slots
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total region size in bytes
    pub const fn region_size(&self) -> usize {
        self.capacity * size_of::<Slot>() + size_of::<LogControl>()
    }

    /// Offset of slot `index`'s header line
    pub const fn header_offset(&self, index: usize) -> usize {
        index * size_of::<Slot>()
    }

    /// Offset of slot `index`'s payload line
    pub const fn payload_offset(&self, index: usize) -> usize {
        index * size_of::<Slot>() + CACHE_LINE_BYTES
    }

    /// Offset of the control line
    pub const fn control_offset(&self) -> usize {
        self.capacity * size_of::<Slot>()
    }

    /// Capacity implied by a region of `size` bytes, if it has a valid shape
    pub const fn capacity_for_size(size: usize) -> Option<usize> {
        let control = size_of::<LogControl>();
        let slot = size_of::<Slot>();
        if size < control + slot || (size - control) % slot != 0 {
            return None;
        }
        Some((size - control) / slot)
    }
}
