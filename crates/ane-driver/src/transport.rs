//! Buffer-management primitives the channel manager consumes.
//!
//! The kernel driver exposes three buffer operations (allocate, map via a
//! fake offset, free) plus the blocking submit. [`AccelTransport`] is that
//! surface as a trait, so the channel and execution layers run unchanged
//! against the real device ([`crate::transports::DrmTransport`]) or the
//! in-memory [`crate::transports::HostTransport`].

use std::fmt::Debug;
use std::ptr::NonNull;

use ane_hw::uapi::SubmitArgs;

use crate::error::Result;

/// Kernel-side identity of an allocated buffer object.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoDesc {
    /// Kernel-assigned handle, referenced by the submit record.
    pub handle: u32,
    /// Fake offset at which to map the buffer.
    pub offset: u64,
}

/// Device-session primitives required by the channel set manager.
pub trait AccelTransport: Debug {
    /// Allocate a buffer object of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the device-side allocation fails.
    fn alloc(&self, size: u64) -> Result<BoDesc>;

    /// Map an allocated buffer object into this process.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping fails.
    fn map(&self, bo: BoDesc, size: u64) -> Result<Mapping>;

    /// Release a buffer object.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the handle.
    fn free(&self, handle: u32) -> Result<()>;

    /// Issue one blocking execution request.
    ///
    /// # Errors
    ///
    /// Propagates the device's failure code verbatim; no retry.
    fn submit(&self, args: &SubmitArgs) -> Result<()>;
}

/// A mapped, writable buffer-object region.
///
/// The device variant wraps an `mmap` of the kernel buffer and unmaps on
/// drop; the host variant owns plain memory. Either way the mapped length
/// equals the channel's declared tile size.
#[derive(Debug)]
pub enum Mapping {
    /// Kernel-backed mapping obtained through the device node.
    Device {
        /// Mapped base address.
        ptr: NonNull<u8>,
        /// Mapped length in bytes.
        len: usize,
    },
    /// Host memory standing in for device memory.
    Host(Box<[u8]>),
}

impl Mapping {
    /// Mapped length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Device { len, .. } => *len,
            Self::Host(buf) => buf.len(),
        }
    }

    /// Whether the mapping is empty (never true for a live channel).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the mapped region.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            // SAFETY: ptr/len come from a successful mmap that lives until
            // drop; the region is readable (PROT_READ | PROT_WRITE).
            Self::Device { ptr, len } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
            Self::Host(buf) => buf,
        }
    }

    /// Mutably view the mapped region.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            // SAFETY: as above, and &mut self guarantees exclusive access.
            Self::Device { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
            Self::Host(buf) => buf,
        }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if let Self::Device { ptr, len } = self {
            // SAFETY: ptr/len were returned by a successful mmap and the
            // mapping has not been unmapped elsewhere.
            unsafe {
                if let Err(e) = rustix::mm::munmap(ptr.as_ptr().cast(), *len) {
                    tracing::error!("munmap of {len:#x}-byte channel failed: {e}");
                }
            }
        }
    }
}

// SAFETY: the device mapping is exclusively owned by this value and stays
// valid until drop; moving it between threads does not invalidate it.
unsafe impl Send for Mapping {}
