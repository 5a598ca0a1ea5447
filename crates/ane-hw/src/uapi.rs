//! Kernel uAPI for the `ane` accel driver.
//!
//! Wire-exact `#[repr(C)]` mirrors of the structures the driver exchanges
//! over ioctl, plus the ioctl numbers themselves. Three driver commands
//! exist beyond the generic version query:
//!
//! - `BO_INIT` — allocate a buffer object; the kernel returns a handle and
//!   the fake mmap offset to map it at.
//! - `BO_FREE` — release a buffer object by handle.
//! - `SUBMIT` — one blocking execution request carrying every populated
//!   slot handle plus the bootstrap handle.

use core::ffi::{c_char, c_int};

use crate::tile::SLOT_COUNT;

/// DRM ioctl character group.
pub const DRM_IOCTL_GROUP: u8 = b'd';

/// First driver-specific command number.
pub const DRM_COMMAND_BASE: u8 = 0x40;

const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;

/// Encode a read/write ioctl number, `_IOWR(type, nr, size)`.
#[must_use]
pub const fn iowr(nr: u8, size: usize) -> u64 {
    ((IOC_READ | IOC_WRITE) << 30)
        | ((size as u64) << 16)
        | ((DRM_IOCTL_GROUP as u64) << 8)
        | (nr as u64)
}

/// Generic DRM version query, `_IOWR('d', 0x00, drm_version)`.
///
/// Two-call protocol: the first call with a null `name` reports
/// `name_len`; the second call fills a caller-provided buffer. The
/// returned name is not guaranteed to be NUL-terminated.
#[repr(C)]
#[derive(Debug)]
pub struct DrmVersion {
    /// Driver major version.
    pub major: c_int,
    /// Driver minor version.
    pub minor: c_int,
    /// Driver patch level.
    pub patchlevel: c_int,
    /// In: capacity of `name`. Out: actual name length.
    pub name_len: usize,
    /// Driver name buffer (caller-owned).
    pub name: *mut c_char,
    /// In: capacity of `date`. Out: actual date length.
    pub date_len: usize,
    /// Driver date buffer (caller-owned).
    pub date: *mut c_char,
    /// In: capacity of `desc`. Out: actual description length.
    pub desc_len: usize,
    /// Driver description buffer (caller-owned).
    pub desc: *mut c_char,
}

impl Default for DrmVersion {
    fn default() -> Self {
        Self {
            major: 0,
            minor: 0,
            patchlevel: 0,
            name_len: 0,
            name: core::ptr::null_mut(),
            date_len: 0,
            date: core::ptr::null_mut(),
            desc_len: 0,
            desc: core::ptr::null_mut(),
        }
    }
}

/// Buffer-object allocation request/reply.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct BoInitArgs {
    /// In: requested size in bytes. Must be tile-aligned and non-zero.
    pub size: u64,
    /// Out: kernel-assigned buffer handle.
    pub handle: u32,
    /// Padding, must be zero.
    pub pad: u32,
    /// Out: fake offset for the subsequent mmap.
    pub offset: u64,
}

/// Buffer-object release request.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct BoFreeArgs {
    /// Handle from a prior [`BoInitArgs`] reply.
    pub handle: u32,
    /// Padding, must be zero.
    pub pad: u32,
}

/// Execution submission record.
///
/// `handles` is indexed exactly like the descriptor's tile-slot array;
/// unpopulated slots stay zero.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SubmitArgs {
    /// Total task size in bytes.
    pub tsk_size: u64,
    /// Size of one task descriptor in bytes.
    pub td_size: u64,
    /// Number of task descriptors.
    pub td_count: u32,
    /// Padding, must be zero.
    pub pad: u32,
    /// Buffer handle per tile slot; zero for unpopulated slots.
    pub handles: [u32; SLOT_COUNT],
    /// Bootstrap (task descriptor) channel handle.
    pub btsp_handle: u32,
    /// Padding, must be zero.
    pub pad2: u32,
}

impl Default for SubmitArgs {
    fn default() -> Self {
        Self {
            tsk_size: 0,
            td_size: 0,
            td_count: 0,
            pad: 0,
            handles: [0; SLOT_COUNT],
            btsp_handle: 0,
            pad2: 0,
        }
    }
}

/// `DRM_IOCTL_VERSION`.
pub const DRM_IOCTL_VERSION: u64 = iowr(0x00, core::mem::size_of::<DrmVersion>());

/// `DRM_IOCTL_ANE_BO_INIT`.
pub const DRM_IOCTL_ANE_BO_INIT: u64 =
    iowr(DRM_COMMAND_BASE, core::mem::size_of::<BoInitArgs>());

/// `DRM_IOCTL_ANE_BO_FREE`.
pub const DRM_IOCTL_ANE_BO_FREE: u64 =
    iowr(DRM_COMMAND_BASE + 1, core::mem::size_of::<BoFreeArgs>());

/// `DRM_IOCTL_ANE_SUBMIT`.
pub const DRM_IOCTL_ANE_SUBMIT: u64 =
    iowr(DRM_COMMAND_BASE + 2, core::mem::size_of::<SubmitArgs>());

// The kernel rejects mis-sized ioctl payloads, so pin the ABI here.
const _: () = assert!(core::mem::size_of::<BoInitArgs>() == 24);
const _: () = assert!(core::mem::size_of::<BoFreeArgs>() == 8);
const _: () = assert!(core::mem::size_of::<SubmitArgs>() == 160);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_numbers_are_stable() {
        // _IOWR('d', nr, size): dir=3, group 'd' = 0x64.
        assert_eq!(iowr(0x00, 64) & 0xff, 0x00);
        assert_eq!((iowr(0x00, 64) >> 8) & 0xff, 0x64);
        assert_eq!((iowr(0x00, 64) >> 16) & 0x3fff, 64);
        assert_eq!(iowr(0x00, 64) >> 30, 3);

        assert_eq!(DRM_IOCTL_ANE_BO_INIT & 0xff, 0x40);
        assert_eq!(DRM_IOCTL_ANE_BO_FREE & 0xff, 0x41);
        assert_eq!(DRM_IOCTL_ANE_SUBMIT & 0xff, 0x42);
    }

    #[test]
    fn submit_record_indexes_all_slots() {
        let args = SubmitArgs::default();
        assert_eq!(args.handles.len(), SLOT_COUNT);
    }
}
