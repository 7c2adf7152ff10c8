//! The durable log context
//!
//! [`DurableLog`] owns everything one log needs: the mapped region, the
//! durability backend, the target table and the in-memory counters. There is
//! no global state; several logs can live in one process.
//!
//! Producer positions are tracked as monotonically increasing sequence
//! numbers. A sequence `s` lives in slot `s % capacity`. Only the durable
//! tail in the control line is stored as a slot index.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::constants::MAX_PAYLOAD_BYTES;
use crate::log::layout::{LogControl, LogLayout, Slot};
use crate::log::types::{LogConfig, LogError, LogErrorKind, LogStats, RecoveryReport};
use crate::persist::{CpuPersist, Persistence};
use crate::region::PersistentRegion;
use crate::target::{write_all_at, TargetDevice, TargetId, TargetTable};

/// A crash-consistent write-ahead log over a persistent region
///
/// Producers call [`append`](Self::append) from any number of threads. A
/// single cleanup thread, started with
/// [`start_cleanup`](Self::start_cleanup), applies committed entries to
/// their targets and checkpoints its progress.
pub struct DurableLog<P: Persistence = CpuPersist> {
    pub(super) config: LogConfig,
    pub(super) layout: LogLayout,
    pub(super) region: PersistentRegion,
    pub(super) persist: P,
    pub(super) targets: TargetTable,
    /// Next sequence handed to a producer
    pub(super) head: CachePadded<AtomicU64>,
    /// Sequence of the last checkpoint, published after the durable tail
    pub(super) visible_tail: CachePadded<AtomicU64>,
    pub(super) stop: AtomicBool,
    pub(super) cleanup_running: AtomicBool,
    pub(super) faulted: AtomicBool,
    pub(super) fault: Mutex<Option<LogError>>,
    pub(super) appended: AtomicU64,
}

/// A committed entry copied out of its slot
#[derive(Clone, Copy)]
pub(super) struct PendingEntry {
    pub(super) target: TargetId,
    pub(super) offset: u64,
    len: usize,
    payload: [u8; MAX_PAYLOAD_BYTES],
}

impl PendingEntry {
    pub(super) fn bytes(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

impl DurableLog<CpuPersist> {
    /// Open (or create) a log, recovering any committed entries first.
    ///
    /// `targets` must list the same devices, in the same order, as the run
    /// that wrote the log.
    pub fn open(
        config: LogConfig,
        targets: TargetTable,
    ) -> Result<(Self, RecoveryReport), LogError> {
        Self::open_with(config, targets, CpuPersist::new())
    }
}

impl<P: Persistence> DurableLog<P> {
    /// Open a log using a specific durability backend.
    pub fn open_with(
        config: LogConfig,
        targets: TargetTable,
        persist: P,
    ) -> Result<(Self, RecoveryReport), LogError> {
        config.validate()?;

        let layout = LogLayout::new(config.capacity);
        let region = match &config.path {
            Some(path) => PersistentRegion::open(path, layout.region_size()),
            None => PersistentRegion::anonymous(layout.region_size()),
        }
        .map_err(|e| LogError::new(LogErrorKind::Region, format!("failed to map region: {e}")))?;
        persist.attach(region.as_ptr(), region.len());

        let fresh = region.is_fresh();
        let mut log = Self {
            config,
            layout,
            region,
            persist,
            targets,
            head: CachePadded::new(AtomicU64::new(0)),
            visible_tail: CachePadded::new(AtomicU64::new(0)),
            stop: AtomicBool::new(false),
            cleanup_running: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
            fault: Mutex::new(None),
            appended: AtomicU64::new(0),
        };

        log.check_control()?;
        let report = log.recover()?;

        info!(
            path = ?log.config.path,
            capacity = log.layout.capacity(),
            fresh,
            replayed = report.replayed,
            "durable log opened"
        );
        Ok((log, report))
    }

    /// Stamp a fresh control line, or check an existing one against the
    /// configured geometry.
    fn check_control(&self) -> Result<(), LogError> {
        let control = self.control();
        let capacity = self.layout.capacity() as u64;

        match control.magic() {
            0 => {
                control.stamp(capacity);
                self.persist.flush_line(control);
                self.persist.strong_sync();
                debug!(capacity, "stamped fresh control line");
                Ok(())
            }
            LogControl::MAGIC => {
                if control.version() != LogControl::VERSION {
                    return Err(LogError::new(
                        LogErrorKind::Region,
                        format!(
                            "unsupported format version {} (expected {})",
                            control.version(),
                            LogControl::VERSION
                        ),
                    ));
                }
                if control.capacity() != capacity {
                    return Err(LogError::new(
                        LogErrorKind::Region,
                        format!(
                            "region holds a log of capacity {}, configured {capacity}",
                            control.capacity()
                        ),
                    ));
                }
                if control.tail() >= capacity {
                    return Err(LogError::new(
                        LogErrorKind::Corruption,
                        format!("durable tail {} out of range", control.tail()),
                    ));
                }
                Ok(())
            }
            other => Err(LogError::new(
                LogErrorKind::Region,
                format!("region is not a log (magic {other:#018x})"),
            )),
        }
    }

    #[inline]
    pub(super) fn slot(&self, index: usize) -> &Slot {
        debug_assert!(index < self.layout.capacity());
        // SAFETY: the region was sized by `layout` and is page aligned, so
        // every slot offset is in bounds and 64-byte aligned. The region
        // lives as long as `self`.
        unsafe { &*(self.region.as_ptr().add(self.layout.header_offset(index)) as *const Slot) }
    }

    #[inline]
    pub(super) fn control(&self) -> &LogControl {
        // SAFETY: as for `slot`; the control line follows the last slot.
        unsafe {
            &*(self.region.as_ptr().add(self.layout.control_offset()) as *const LogControl)
        }
    }

    #[inline]
    pub(super) fn slot_index(&self, sequence: u64) -> usize {
        (sequence % self.layout.capacity() as u64) as usize
    }

    /// Copy a committed entry out of slot `index`, checking its header.
    ///
    /// The caller must have seen the slot committed.
    pub(super) fn read_entry(&self, index: usize) -> Result<PendingEntry, LogError> {
        let slot = self.slot(index);
        let target = TargetId::new(slot.header.target());
        let len = slot.header.length() as usize;

        if len > MAX_PAYLOAD_BYTES {
            return Err(LogError::new(
                LogErrorKind::Corruption,
                format!("slot {index} records a {len}-byte payload"),
            ));
        }
        if !self.targets.contains(target) {
            return Err(LogError::new(
                LogErrorKind::Corruption,
                format!("slot {index} names unregistered {target}"),
            ));
        }

        // SAFETY: the slot is committed, so its producer is done with it and
        // no new producer can reserve it until it is released.
        let payload = unsafe { slot.payload.read() };
        Ok(PendingEntry {
            target,
            offset: slot.header.offset(),
            len,
            payload,
        })
    }

    /// Write an entry's bytes to its target. Does not sync.
    pub(super) fn write_entry(&self, entry: &PendingEntry) -> Result<(), LogError> {
        let device = self.device(entry.target)?;
        write_all_at(device.as_ref(), entry.offset, entry.bytes())
            .map_err(|e| LogError::io(format!("write to {}", entry.target), e))
    }

    pub(super) fn device(
        &self,
        target: TargetId,
    ) -> Result<&std::sync::Arc<dyn TargetDevice>, LogError> {
        self.targets.get(target).ok_or_else(|| {
            LogError::new(LogErrorKind::Target, format!("unknown {target}"))
        })
    }

    /// Record an unrecoverable cleanup failure. Producers stop waiting.
    pub(super) fn record_fault(&self, error: LogError) {
        *self.fault.lock() = Some(error);
        self.faulted.store(true, Ordering::Release);
    }

    pub(super) fn fault_error(&self) -> LogError {
        let cause = self
            .fault
            .lock()
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown cause".to_string());
        LogError::new(
            LogErrorKind::Faulted,
            format!("cleanup thread stopped: {cause}"),
        )
    }

    /// Configuration the log was opened with
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.layout.capacity()
    }

    /// Registered targets
    pub fn targets(&self) -> &TargetTable {
        &self.targets
    }

    /// Backing file of the region, if any
    pub fn path(&self) -> Option<&Path> {
        self.region.path()
    }

    /// The durability backend
    pub fn persistence(&self) -> &P {
        &self.persist
    }

    /// Reserved entries not yet covered by a checkpoint
    pub fn outstanding(&self) -> usize {
        let tail = self.visible_tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.saturating_sub(tail) as usize
    }

    /// Whether the cleanup thread stopped on an error
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// The error that stopped the cleanup thread, if any
    pub fn fault(&self) -> Option<LogError> {
        self.fault.lock().clone()
    }

    /// Whether a cleanup thread is currently attached
    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup_running.load(Ordering::Acquire)
    }

    /// Snapshot of the log's counters
    pub fn stats(&self) -> LogStats {
        let visible_tail = self.visible_tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        LogStats {
            capacity: self.layout.capacity(),
            head: self.slot_index(head),
            visible_tail: self.slot_index(visible_tail),
            durable_tail: self.control().tail(),
            outstanding: head.saturating_sub(visible_tail) as usize,
            appended: self.appended.load(Ordering::Relaxed),
            faulted: self.is_faulted(),
        }
    }

    /// Write the mapping back to its file.
    ///
    /// The log does not depend on this for correctness on persistent memory;
    /// on an ordinary filesystem it makes the region survive power loss.
    pub fn close(&self) -> Result<(), LogError> {
        self.region
            .sync()
            .map_err(|e| LogError::new(LogErrorKind::Region, format!("failed to sync region: {e}")))
    }
}

impl<P: Persistence> std::fmt::Debug for DurableLog<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLog")
            .field("capacity", &self.layout.capacity())
            .field("path", &self.region.path())
            .field("targets", &self.targets.len())
            .finish()
    }
}
