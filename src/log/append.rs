//! Producer path
//!
//! Reservation is a CAS on `head`, gated by `visible_tail`: a producer never
//! takes the slot that would make `head` catch up with the last checkpoint,
//! so at most `capacity - 1` entries are outstanding. The gate is the
//! checkpointed tail rather than the cleanup cursor, so a slot is reused only
//! after the durable tail has moved past it.
//!
//! Once a slot is reserved the producer owns it until it sets the commit
//! word. The commit is ordered after the payload and header are durable.

use std::sync::atomic::Ordering;

use crate::constants::MAX_PAYLOAD_BYTES;
use crate::log::durable_log::DurableLog;
use crate::log::types::{LogError, LogErrorKind};
use crate::persist::Persistence;
use crate::target::TargetId;

impl<P: Persistence> DurableLog<P> {
    /// Durably log a write of `payload` at `offset` in `target`.
    ///
    /// Spins (through the reservation backoff policy) while the log is full.
    /// Returns the slot index the entry was committed in once the entry is
    /// durable. The write reaches the target later, through the cleanup
    /// thread or through recovery.
    pub fn append(&self, target: TargetId, payload: &[u8], offset: u64) -> Result<usize, LogError> {
        self.check_entry(target, payload)?;
        let sequence = self.reserve()?;
        Ok(self.commit(sequence, target, payload, offset))
    }

    /// Like [`append`](Self::append), but fails with
    /// [`LogErrorKind::Full`] instead of waiting for a free slot.
    pub fn try_append(
        &self,
        target: TargetId,
        payload: &[u8],
        offset: u64,
    ) -> Result<usize, LogError> {
        self.check_entry(target, payload)?;
        let sequence = self.try_reserve()?.ok_or_else(|| {
            LogError::new(LogErrorKind::Full, "no free slot until the next checkpoint")
        })?;
        Ok(self.commit(sequence, target, payload, offset))
    }

    fn check_entry(&self, target: TargetId, payload: &[u8]) -> Result<(), LogError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(LogError::new(
                LogErrorKind::Payload,
                format!(
                    "payload of {} bytes exceeds the {MAX_PAYLOAD_BYTES}-byte entry limit",
                    payload.len()
                ),
            ));
        }
        if !self.targets.contains(target) {
            return Err(LogError::new(
                LogErrorKind::Target,
                format!("unknown {target}"),
            ));
        }
        Ok(())
    }

    /// Reserve the next sequence, waiting while the log is full.
    fn reserve(&self) -> Result<u64, LogError> {
        let waiter = self.config.reservation_backoff.waiter();
        loop {
            if let Some(sequence) = self.try_reserve()? {
                return Ok(sequence);
            }
            waiter.wait();
        }
    }

    /// One reservation attempt. `Ok(None)` means the log is full.
    ///
    /// CAS failures caused by other producers are retried here; only a full
    /// log returns.
    fn try_reserve(&self) -> Result<Option<u64>, LogError> {
        let capacity = self.layout.capacity() as u64;
        loop {
            if self.faulted.load(Ordering::Acquire) {
                return Err(self.fault_error());
            }

            // Tail first: a later head load can only be larger, so
            // `head >= tail` holds.
            let tail = self.visible_tail.load(Ordering::Acquire);
            let head = self.head.load(Ordering::Acquire);
            if head + 1 - tail >= capacity {
                return Ok(None);
            }

            if self
                .head
                .compare_exchange_weak(head, head + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(Some(head));
            }
        }
    }

    /// Fill and commit a reserved slot.
    fn commit(&self, sequence: u64, target: TargetId, payload: &[u8], offset: u64) -> usize {
        let index = self.slot_index(sequence);
        let slot = self.slot(index);

        // SAFETY: `sequence` was reserved by this call. The slot was released
        // (commit word cleared) before the checkpoint that let `head` reach
        // it, so no other thread touches it until it is committed.
        unsafe { slot.payload.write(payload) };
        self.persist.flush_line(&slot.payload);

        slot.header
            .store_fields(target.raw(), payload.len() as u32, offset);
        self.persist.flush_line(&slot.header);
        self.persist.fence();

        slot.header.mark_committed();
        self.persist.flush_line(&slot.header);
        self.persist.fence();

        self.appended.fetch_add(1, Ordering::Relaxed);
        index
    }
}

#[cfg(test)]
mod tests {
    use crate::log::{DurableLog, LogConfig, LogErrorKind};
    use crate::target::{MemTarget, TargetId, TargetTable};

    fn open_anon(capacity: usize) -> (DurableLog, TargetId) {
        let mut targets = TargetTable::new();
        let id = targets.register(MemTarget::new());
        let (log, _) =
            DurableLog::open(LogConfig::anonymous().with_capacity(capacity), targets).unwrap();
        (log, id)
    }

    #[test]
    fn test_append_commits_in_order() {
        let (log, target) = open_anon(8);
        assert_eq!(log.append(target, b"a", 0).unwrap(), 0);
        assert_eq!(log.append(target, b"b", 1).unwrap(), 1);

        let slot = log.slot(1);
        assert!(slot.header.is_committed());
        assert_eq!(slot.header.length(), 1);
        assert_eq!(slot.header.offset(), 1);
        assert_eq!(log.outstanding(), 2);
    }

    #[test]
    fn test_payload_cap_is_enforced() {
        let (log, target) = open_anon(4);
        assert!(log.append(target, &[7u8; 64], 0).is_ok());

        let err = log.append(target, &[7u8; 65], 0).unwrap_err();
        assert_eq!(err.kind, LogErrorKind::Payload);
        assert_eq!(log.outstanding(), 1);
    }

    #[test]
    fn test_empty_payload_is_accepted() {
        let (log, target) = open_anon(4);
        let index = log.append(target, b"", 10).unwrap();
        assert!(log.slot(index).header.is_committed());
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let (log, _) = open_anon(4);
        let err = log.append(TargetId::new(9), b"x", 0).unwrap_err();
        assert_eq!(err.kind, LogErrorKind::Target);
    }

    #[test]
    fn test_try_append_reports_full() {
        let (log, target) = open_anon(4);
        for i in 0..3 {
            log.try_append(target, b"x", i).unwrap();
        }
        let err = log.try_append(target, b"x", 3).unwrap_err();
        assert_eq!(err.kind, LogErrorKind::Full);
        assert!(err.status().is_full());
        assert_eq!(log.outstanding(), 3);
    }

    #[test]
    fn test_faulted_log_rejects_appends() {
        let (log, target) = open_anon(4);
        log.record_fault(crate::log::LogError::new(LogErrorKind::Io, "boom"));
        let err = log.append(target, b"x", 0).unwrap_err();
        assert_eq!(err.kind, LogErrorKind::Faulted);
    }
}
