//! Log inspection utilities
//!
//! Reads a log's backing file without mapping or recovering it. Nothing is
//! written, so this is safe to point at the file of a crashed process to see
//! what recovery would replay.

use std::fs;
use std::path::Path;

use crate::constants::CACHE_LINE_BYTES;
use crate::log::layout::{LogControl, LogControlImage, LogLayout, SlotHeaderImage};
use crate::log::types::{LogError, LogErrorKind};
use crate::target::TargetId;

/// A committed entry found in a backing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedEntry {
    /// Slot index
    pub slot: usize,
    /// Target the write is destined for
    pub target: TargetId,
    /// Absolute offset in the target
    pub offset: u64,
    /// Payload bytes
    pub payload: Vec<u8>,
}

/// Contents of a log backing file
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    /// Capacity recorded in the control line
    pub capacity: usize,
    /// Format version
    pub version: u32,
    /// Durable tail
    pub tail: u64,
    /// Committed entries, oldest first (starting at the durable tail)
    pub committed: Vec<CommittedEntry>,
}

impl LogSnapshot {
    /// Whether recovery would find nothing to replay
    pub fn is_clean(&self) -> bool {
        self.committed.is_empty()
    }
}

/// Inspector for log backing files
pub struct LogInspector;

impl LogInspector {
    /// Read the backing file at `path`.
    ///
    /// The capacity is taken from the control line and checked against the
    /// file size.
    pub fn read(path: impl AsRef<Path>) -> Result<LogSnapshot, LogError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| LogError::io(format!("read {}", path.display()), e))?;
        Self::decode(&bytes)
    }

    /// Check if a file holds a stamped log.
    pub fn is_valid_log(path: impl AsRef<Path>) -> bool {
        Self::read(path).is_ok()
    }

    /// Decode a raw region image.
    pub fn decode(bytes: &[u8]) -> Result<LogSnapshot, LogError> {
        let capacity = LogLayout::capacity_for_size(bytes.len()).ok_or_else(|| {
            LogError::new(
                LogErrorKind::Region,
                format!("{} bytes is not a valid region size", bytes.len()),
            )
        })?;
        let layout = LogLayout::new(capacity);

        let control: LogControlImage =
            bytemuck::pod_read_unaligned(line(bytes, layout.control_offset()));
        if control.magic != LogControl::MAGIC {
            return Err(LogError::new(
                LogErrorKind::Region,
                format!("bad magic {:#018x}", control.magic),
            ));
        }
        if control.capacity != capacity as u64 {
            return Err(LogError::new(
                LogErrorKind::Region,
                format!(
                    "control line records capacity {}, file holds {capacity} slots",
                    control.capacity
                ),
            ));
        }
        if control.tail >= capacity as u64 {
            return Err(LogError::new(
                LogErrorKind::Corruption,
                format!("durable tail {} out of range", control.tail),
            ));
        }

        let start = control.tail as usize;
        let mut committed = Vec::new();
        for step in 0..capacity {
            let slot = (start + step) % capacity;
            let header: SlotHeaderImage =
                bytemuck::pod_read_unaligned(line(bytes, layout.header_offset(slot)));
            if !header.is_committed() {
                continue;
            }

            let len = header.length as usize;
            if len > CACHE_LINE_BYTES {
                return Err(LogError::new(
                    LogErrorKind::Corruption,
                    format!("slot {slot} records a {len}-byte payload"),
                ));
            }
            let payload = &line(bytes, layout.payload_offset(slot))[..len];
            committed.push(CommittedEntry {
                slot,
                target: TargetId::new(header.target),
                offset: header.offset,
                payload: payload.to_vec(),
            });
        }

        Ok(LogSnapshot {
            capacity,
            version: control.version,
            tail: control.tail,
            committed,
        })
    }
}

fn line(bytes: &[u8], offset: usize) -> &[u8] {
    &bytes[offset..offset + CACHE_LINE_BYTES]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{DurableLog, LogConfig};
    use crate::target::{MemTarget, TargetTable};
    use tempfile::tempdir;

    #[test]
    fn test_inspect_sees_unapplied_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.dat");
        let mut targets = TargetTable::new();
        let id = targets.register(MemTarget::new());

        {
            let (log, _) =
                DurableLog::open(LogConfig::new(&path).with_capacity(4), targets).unwrap();
            log.append(id, b"hello", 5).unwrap();
            log.append(id, b"world", 10).unwrap();
            log.close().unwrap();
        }

        let snapshot = LogInspector::read(&path).unwrap();
        assert_eq!(snapshot.capacity, 4);
        assert_eq!(snapshot.tail, 0);
        assert_eq!(snapshot.committed.len(), 2);
        assert_eq!(snapshot.committed[0].payload, b"hello");
        assert_eq!(snapshot.committed[1].offset, 10);
        assert!(!snapshot.is_clean());
    }

    #[test]
    fn test_decode_rejects_bad_size_and_magic() {
        let err = LogInspector::decode(&[0u8; 100]).unwrap_err();
        assert_eq!(err.kind, LogErrorKind::Region);

        let err = LogInspector::decode(&[0u8; 4 * 128 + 64]).unwrap_err();
        assert_eq!(err.kind, LogErrorKind::Region);
    }

    #[test]
    fn test_missing_file_is_not_a_log() {
        let dir = tempdir().unwrap();
        assert!(!LogInspector::is_valid_log(dir.path().join("missing.dat")));
    }
}
