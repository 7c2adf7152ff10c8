//! Target registry

use std::fmt;
use std::sync::Arc;

use crate::target::TargetDevice;

/// Identity of a registered target, as recorded in a slot header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u32);

impl TargetId {
    /// Create an id from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value stored in the log
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// The set of devices a log applies entries to
///
/// Ids are assigned in registration order. A log must be reopened with the
/// targets registered in the same order, or recovery will replay entries
/// onto the wrong devices.
#[derive(Default, Clone)]
pub struct TargetTable {
    devices: Vec<Arc<dyn TargetDevice>>,
}

impl TargetTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, taking ownership of it
    pub fn register<T: TargetDevice>(&mut self, device: T) -> TargetId {
        self.register_shared(Arc::new(device))
    }

    /// Register a device that the caller keeps a handle to
    pub fn register_shared(&mut self, device: Arc<dyn TargetDevice>) -> TargetId {
        let id = TargetId(self.devices.len() as u32);
        self.devices.push(device);
        id
    }

    /// Look up a device by id
    #[inline]
    pub fn get(&self, id: TargetId) -> Option<&Arc<dyn TargetDevice>> {
        self.devices.get(id.0 as usize)
    }

    /// Whether `id` names a registered device
    #[inline]
    pub fn contains(&self, id: TargetId) -> bool {
        (id.0 as usize) < self.devices.len()
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is registered
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl fmt::Debug for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetTable")
            .field("len", &self.devices.len())
            .finish()
    }
}
