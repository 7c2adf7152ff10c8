//! Recovery
//!
//! Recovery runs before any producer or cleanup thread exists. It replays
//! every committed slot, starting at the durable tail so entries are applied
//! oldest first, and only releases the slots once all touched targets are
//! synced. A crash anywhere in here leaves the commit words set, and the
//! next recovery replays the same entries again. Reapplying a write is
//! harmless because every entry is an absolute-offset overwrite.

use std::sync::atomic::Ordering;

use tracing::{debug, info};

use crate::log::durable_log::DurableLog;
use crate::log::types::{LogError, RecoveryReport};
use crate::persist::Persistence;

impl<P: Persistence> DurableLog<P> {
    /// Replay committed entries and reset the log to empty.
    ///
    /// [`open`](DurableLog::open) already calls this; running it again on
    /// a recovered log finds nothing to replay. On error the commit words are
    /// left intact so a later recovery can retry. A successful recovery also
    /// clears a fault left by a previous cleanup thread.
    pub fn recover(&mut self) -> Result<RecoveryReport, LogError> {
        let capacity = self.layout.capacity();
        let start_tail = self.control().tail();
        let start = start_tail as usize % capacity;

        let mut replayed = 0;
        let mut touched = vec![false; self.targets.len()];

        for step in 0..capacity {
            let index = (start + step) % capacity;
            if !self.slot(index).header.is_committed() {
                continue;
            }

            let entry = self.read_entry(index)?;
            self.write_entry(&entry)?;
            touched[entry.target.raw() as usize] = true;
            replayed += 1;

            if tracing::enabled!(tracing::Level::DEBUG) {
                debug!(slot = index, target = %entry.target, offset = entry.offset, "replayed entry");
            }
        }

        if replayed > 0 {
            for (raw, _) in touched.iter().enumerate().filter(|(_, hit)| **hit) {
                let target = crate::target::TargetId::new(raw as u32);
                self.device(target)?
                    .sync()
                    .map_err(|e| LogError::io(format!("sync of {target}"), e))?;
            }

            for step in 0..capacity {
                let header = &self.slot((start + step) % capacity).header;
                header.clear_committed();
                self.persist.flush_line(header);
                self.persist.fence();
            }
        }

        let control = self.control();
        control.set_tail(0);
        self.persist.flush_line(control);
        self.persist.strong_sync();

        self.head.store(0, Ordering::Release);
        self.visible_tail.store(0, Ordering::Release);
        *self.fault.get_mut() = None;
        self.faulted.store(false, Ordering::Release);

        if replayed > 0 {
            info!(replayed, start_tail, "recovered committed entries");
        }

        Ok(RecoveryReport {
            replayed,
            scanned: capacity,
            start_tail,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::log::{DurableLog, LogConfig};
    use crate::target::{MemTarget, TargetId, TargetTable};

    #[test]
    fn test_recover_replays_in_memory_log() {
        let mem = Arc::new(MemTarget::new());
        let mut targets = TargetTable::new();
        let id = targets.register_shared(mem.clone());
        let (mut log, _) =
            DurableLog::open(LogConfig::anonymous().with_capacity(4), targets).unwrap();

        log.append(id, b"hello", 0).unwrap();
        log.append(id, b"HE", 0).unwrap();

        let report = log.recover().unwrap();
        assert_eq!(report.replayed, 2);
        assert_eq!(report.scanned, 4);
        assert_eq!(mem.contents(), b"HEllo");
        assert_eq!(mem.sync_count(), 1);

        for index in 0..4 {
            assert!(!log.slot(index).header.is_committed());
        }
        assert_eq!(log.outstanding(), 0);
        assert_eq!(log.control().tail(), 0);
    }

    #[test]
    fn test_recover_twice_is_a_no_op() {
        let mem = Arc::new(MemTarget::new());
        let mut targets = TargetTable::new();
        let id = targets.register_shared(mem.clone());
        let (mut log, _) =
            DurableLog::open(LogConfig::anonymous().with_capacity(4), targets).unwrap();
        log.append(id, b"x", 3).unwrap();

        assert_eq!(log.recover().unwrap().replayed, 1);
        let writes = mem.write_count();
        let again = log.recover().unwrap();
        assert!(again.was_clean());
        assert_eq!(mem.write_count(), writes);
    }

    #[test]
    fn test_recover_clears_fault() {
        let mut targets = TargetTable::new();
        let id: TargetId = targets.register(MemTarget::new());
        let (mut log, _) =
            DurableLog::open(LogConfig::anonymous().with_capacity(4), targets).unwrap();
        log.record_fault(crate::log::LogError::new(
            crate::log::LogErrorKind::Io,
            "boom",
        ));
        assert!(log.append(id, b"x", 0).is_err());

        log.recover().unwrap();
        assert!(!log.is_faulted());
        assert!(log.append(id, b"x", 0).is_ok());
    }
}
