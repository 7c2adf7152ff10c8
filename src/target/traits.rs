//! Target device trait

use std::io;

/// A device that log entries are applied to
///
/// Writes are positional overwrites, never appends: applying the same entry
/// twice leaves the device in the same state, which is what makes replay
/// after a crash safe.
pub trait TargetDevice: Send + Sync + 'static {
    /// Write `buf` at `offset`, returning the number of bytes written
    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<usize>;

    /// Make every completed write durable
    fn sync(&self) -> io::Result<()>;

    /// Read into `buf` from `offset`, returning the number of bytes read.
    ///
    /// The log never reads its targets; write-only devices can keep this.
    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "target does not support reads",
        ))
    }

    /// Current size of the device in bytes
    fn size(&self) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "target does not report its size",
        ))
    }
}

/// Write all of `buf` at `offset`.
///
/// Short writes are continued; a write that makes no progress is an error.
pub fn write_all_at(device: &dyn TargetDevice, offset: u64, buf: &[u8]) -> io::Result<()> {
    let mut written = 0usize;
    while written < buf.len() {
        let n = device.write_at(offset + written as u64, &buf[written..])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!(
                    "write at offset {offset} stalled after {written} of {} bytes",
                    buf.len()
                ),
            ));
        }
        written += n;
    }
    Ok(())
}
