//! In-memory apply target
//!
//! A target that keeps its contents in memory. Useful for testing and for
//! measuring the log without file I/O on the apply path.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::target::TargetDevice;

/// In-memory target device
///
/// Stores written bytes and counts writes and syncs.
#[derive(Debug, Default)]
pub struct MemTarget {
    data: Mutex<Vec<u8>>,
    writes: AtomicU64,
    syncs: AtomicU64,
}

impl MemTarget {
    /// Create an empty in-memory target
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a target pre-filled with `len` zero bytes
    pub fn with_size(len: usize) -> Self {
        Self {
            data: Mutex::new(vec![0u8; len]),
            ..Self::default()
        }
    }

    /// Copy of the current contents
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Number of write calls observed
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Number of sync calls observed
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Acquire)
    }
}

impl TargetDevice for MemTarget {
    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let end = start + buf.len();

        let mut data = self.data.lock();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(buf.len())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.lock();
        let start = offset as usize;
        if start >= data.len() {
            return Ok(0);
        }
        let end = std::cmp::min(start + buf.len(), data.len());
        let len = end - start;
        buf[..len].copy_from_slice(&data[start..end]);
        Ok(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.syncs.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.data.lock().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_target_write_read() {
        let target = MemTarget::new();
        assert_eq!(target.write_at(4, b"data").unwrap(), 4);

        let mut buf = [1u8; 8];
        assert_eq!(target.read_at(0, &mut buf).unwrap(), 8);
        assert_eq!(&buf, b"\0\0\0\0data");
        assert_eq!(target.write_count(), 1);
    }

    #[test]
    fn test_mem_target_read_past_end() {
        let target = MemTarget::with_size(4);
        let mut buf = [0u8; 4];
        assert_eq!(target.read_at(10, &mut buf).unwrap(), 0);
        assert_eq!(target.read_at(2, &mut buf).unwrap(), 2);
    }

    #[test]
    fn test_mem_target_counts_syncs() {
        let target = MemTarget::new();
        target.sync().unwrap();
        target.sync().unwrap();
        assert_eq!(target.sync_count(), 2);
        assert_eq!(target.size().unwrap(), 0);
    }
}
