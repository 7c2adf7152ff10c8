//! Persistent region
//!
//! A byte region backed by a file and mapped read-write into the process.
//! The region is sized once, when it is opened, to exactly fit the log.
//!
//! The mapping is an ordinary shared mapping. On a DAX filesystem backed by
//! persistent memory the cache flushes issued by the log make updates
//! durable; anywhere else the region still behaves identically in-process
//! but offers no guarantee across power loss. The log code does not branch
//! on which case applies.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use memmap2::MmapMut;

/// A mapped region holding the log structure
pub struct PersistentRegion {
    /// The mapping. Only accessed through `base` after construction.
    map: MmapMut,
    /// Base pointer taken once from the mapping
    base: NonNull<u8>,
    /// Length of the region in bytes
    len: usize,
    /// Backing file, if any
    path: Option<PathBuf>,
    /// Whether the backing file was empty before opening
    fresh: bool,
}

impl PersistentRegion {
    /// Open or create the backing file at `path` and map `len` bytes of it.
    ///
    /// An empty file is extended with zeros to `len`. A non-empty file of any
    /// other length was created for a different log geometry and is rejected
    /// before anything in it is touched.
    pub fn open(path: impl AsRef<Path>, len: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "region length must be non-zero",
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let current = file.metadata()?.len();
        if current != 0 && current != len as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "region file {} is {current} bytes, expected {len}",
                    path.display()
                ),
            ));
        }
        if current == 0 {
            file.set_len(len as u64)?;
            file.sync_all()?;
        }

        // SAFETY: the file is owned by this process for the lifetime of the
        // log; concurrent modification by other processes is not supported.
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| io::Error::other("mapping returned a null base"))?;

        Ok(Self {
            map,
            base,
            len,
            path: Some(path),
            fresh: current == 0,
        })
    }

    /// Create a zero-filled region with no backing file
    pub fn anonymous(len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "region length must be non-zero",
            ));
        }
        let mut map = MmapMut::map_anon(len)?;
        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| io::Error::other("mapping returned a null base"))?;

        Ok(Self {
            map,
            base,
            len,
            path: None,
            fresh: true,
        })
    }

    /// Base address of the region
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Length of the region in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty (never true for an opened region)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the backing file had no contents before it was opened
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Write dirty pages of the mapping back to the backing file.
    pub fn sync(&self) -> io::Result<()> {
        if self.path.is_some() {
            self.map.flush()?;
        }
        Ok(())
    }
}

// Safety: the region is plain memory; synchronization of its contents is
// the responsibility of the structures laid over it.
unsafe impl Send for PersistentRegion {}
unsafe impl Sync for PersistentRegion {}

impl std::fmt::Debug for PersistentRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentRegion")
            .field("len", &self.len)
            .field("path", &self.path)
            .field("fresh", &self.fresh)
            .finish()
    }
}
