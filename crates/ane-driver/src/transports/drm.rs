//! Kernel-backed transport over an `accel` device node.
//!
//! Buffer objects come from the `ane` driver's BO_INIT/BO_FREE ioctls and
//! are mapped through the fake offset the kernel hands back; submission is
//! one blocking SUBMIT ioctl. Ioctls go through `libc::ioctl` with the
//! numbers encoded in [`ane_hw::uapi`] — rustix's ioctl API wants a trait
//! impl per variant, which doesn't pay off for a three-command driver.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::NonNull;

use ane_hw::uapi::{
    BoFreeArgs, BoInitArgs, DrmVersion, SubmitArgs, DRM_IOCTL_ANE_BO_FREE,
    DRM_IOCTL_ANE_BO_INIT, DRM_IOCTL_ANE_SUBMIT, DRM_IOCTL_VERSION,
};

use crate::error::{AneError, Result};
use crate::transport::{AccelTransport, BoDesc, Mapping};

/// Transport over one open `accel` device node.
#[derive(Debug)]
pub struct DrmTransport {
    file: File,
}

impl DrmTransport {
    /// Open a device node read-write.
    ///
    /// No identity check is performed here; see [`Self::driver_name`].
    ///
    /// # Errors
    ///
    /// Returns [`AneError::Io`] if the node cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Query the kernel driver's name via the generic version ioctl.
    ///
    /// Two-call protocol: first call learns the name length, second call
    /// fills the buffer. The result is not NUL-terminated by the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`AneError::Device`] if either ioctl fails or the driver
    /// reports an empty name.
    pub fn driver_name(&self) -> Result<String> {
        let mut probe = DrmVersion::default();
        self.ioctl(DRM_IOCTL_VERSION, &mut probe, "version query")?;

        if probe.name_len == 0 {
            return Err(AneError::device("driver reports empty name"));
        }

        let mut name = vec![0u8; probe.name_len];
        let mut version = DrmVersion {
            name_len: name.len(),
            name: name.as_mut_ptr().cast(),
            ..DrmVersion::default()
        };
        self.ioctl(DRM_IOCTL_VERSION, &mut version, "version query")?;

        let len = version.name_len.min(name.len());
        Ok(String::from_utf8_lossy(&name[..len]).into_owned())
    }

    fn ioctl<T>(&self, request: u64, args: &mut T, what: &str) -> Result<()> {
        // SAFETY: request/args pairs are pinned to each other by the
        // callers in this file, the argument structs are #[repr(C)] wire
        // mirrors with compile-time size assertions, and the fd is owned
        // by self and open for the duration of the call.
        let ret = unsafe {
            libc::ioctl(self.file.as_raw_fd(), request as _, &raw mut *args)
        };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            return Err(AneError::device(format!("{what} failed: {err}")));
        }
        Ok(())
    }
}

impl AccelTransport for DrmTransport {
    fn alloc(&self, size: u64) -> Result<BoDesc> {
        if size == 0 {
            return Err(AneError::invalid_argument("zero-sized allocation"));
        }

        let mut args = BoInitArgs {
            size,
            ..BoInitArgs::default()
        };
        self.ioctl(DRM_IOCTL_ANE_BO_INIT, &mut args, "bo_init").map_err(
            |e| AneError::allocation(size, e.to_string()),
        )?;

        tracing::trace!("bo_init: {size:#x} bytes -> handle {}", args.handle);
        Ok(BoDesc {
            handle: args.handle,
            offset: args.offset,
        })
    }

    fn map(&self, bo: BoDesc, size: u64) -> Result<Mapping> {
        let len = usize::try_from(size)
            .map_err(|_| AneError::invalid_argument("mapping size overflows usize"))?;

        // SAFETY: the fd is valid, len is non-zero (alloc rejected zero),
        // and the offset was issued by the kernel for this buffer object.
        // The resulting region lives until Mapping::drop unmaps it.
        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                len,
                rustix::mm::ProtFlags::READ | rustix::mm::ProtFlags::WRITE,
                rustix::mm::MapFlags::SHARED,
                &self.file,
                bo.offset,
            )
            .map_err(|e| AneError::device(format!("mmap failed: {e}")))?
        };

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| AneError::device("mmap returned null"))?;

        tracing::trace!("mapped handle {} at {ptr:p} ({len:#x} bytes)", bo.handle);
        Ok(Mapping::Device { ptr, len })
    }

    fn free(&self, handle: u32) -> Result<()> {
        let mut args = BoFreeArgs { handle, pad: 0 };
        self.ioctl(DRM_IOCTL_ANE_BO_FREE, &mut args, "bo_free")
    }

    fn submit(&self, args: &SubmitArgs) -> Result<()> {
        let mut args = *args;
        self.ioctl(DRM_IOCTL_ANE_SUBMIT, &mut args, "submit")
    }
}
