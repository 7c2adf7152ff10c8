//! Status codes for log operations
//!
//! This module defines the coarse status codes reported by pmwal. Detailed
//! errors (`LogError`) map onto these codes via [`LogError::status`].
//!
//! [`LogError::status`]: crate::log::LogError::status

use std::fmt;

/// Status code returned by log operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Operation completed successfully
    #[default]
    Ok = 0,
    /// No free slot is available until the next checkpoint
    Full = 1,
    /// I/O error occurred
    IoError = 2,
    /// Data corruption detected
    Corruption = 3,
    /// Operation was aborted
    Aborted = 4,
    /// Invalid argument provided
    InvalidArgument = 5,
    /// Invalid operation in current state
    InvalidOperation = 6,
}

impl Status {
    /// Check if the status indicates success
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Check if the status is transient backpressure
    #[inline]
    pub const fn is_full(&self) -> bool {
        matches!(self, Status::Full)
    }

    /// Check if the status indicates an error
    #[inline]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Status::IoError
                | Status::Corruption
                | Status::Aborted
                | Status::InvalidArgument
                | Status::InvalidOperation
        )
    }

    /// Get the status as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "Ok",
            Status::Full => "Full",
            Status::IoError => "IoError",
            Status::Corruption => "Corruption",
            Status::Aborted => "Aborted",
            Status::InvalidArgument => "InvalidArgument",
            Status::InvalidOperation => "InvalidOperation",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
