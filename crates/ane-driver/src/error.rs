//! Error types for ANE driver operations

use thiserror::Error;

/// Result type alias for ANE operations
pub type Result<T> = std::result::Result<T, AneError>;

/// Errors that can occur during ANE operations
#[derive(Debug, Error)]
pub enum AneError {
    /// Caller passed an out-of-range or inconsistent argument
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong
        reason: String,
    },

    /// Fewer matching devices exist than the requested index
    #[error("Device {index} not found ({found} matching device(s) present)")]
    NotFound {
        /// Requested device index
        index: usize,
        /// Number of matching devices actually found
        found: usize,
    },

    /// I/O error on the descriptor source or a device node
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Host or device-side allocation failure
    #[error("Allocation of {size:#x} bytes failed: {reason}")]
    Allocation {
        /// Requested size in bytes
        size: u64,
        /// Reason for failure
        reason: String,
    },

    /// Device call or mapping failure
    #[error("Device error: {reason}")]
    Device {
        /// Reason for failure
        reason: String,
    },

    /// Network descriptor failed parse-time validation
    #[error("Bad descriptor: {reason}")]
    Descriptor {
        /// Which field or invariant was violated
        reason: String,
    },
}

impl AneError {
    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an allocation failure error
    pub fn allocation(size: u64, reason: impl Into<String>) -> Self {
        Self::Allocation {
            size,
            reason: reason.into(),
        }
    }

    /// Create a device error
    pub fn device(reason: impl Into<String>) -> Self {
        Self::Device {
            reason: reason.into(),
        }
    }

    /// Create a descriptor validation error
    pub fn descriptor(reason: impl Into<String>) -> Self {
        Self::Descriptor {
            reason: reason.into(),
        }
    }
}
