//! In-memory transport.
//!
//! Implements [`AccelTransport`] over plain host memory — no device node,
//! no kernel module. Channel and submission logic runs unchanged, which
//! makes this the CI path and the harness for fault-injection tests: an
//! allocation budget can be set to make the k-th allocation fail.
//!
//! The allocation table sits behind a shared handle, so a clone taken
//! before binding a network can observe live-allocation counts and the
//! last submit record afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ane_hw::tile;
use ane_hw::uapi::SubmitArgs;

use crate::error::{AneError, Result};
use crate::transport::{AccelTransport, BoDesc, Mapping};

/// Host-memory transport with a shareable allocation table.
#[derive(Debug, Clone, Default)]
pub struct HostTransport {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    next_handle: u32,
    next_offset: u64,
    live: HashMap<u32, u64>,
    allocs_left: Option<usize>,
    last_submit: Option<SubmitArgs>,
}

impl HostTransport {
    /// Create a transport with no allocation budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose first `limit` allocations succeed and
    /// whose subsequent allocations fail.
    #[must_use]
    pub fn with_alloc_limit(limit: usize) -> Self {
        let this = Self::new();
        this.state_mut().allocs_left = Some(limit);
        this
    }

    /// Number of buffer objects currently allocated and not freed.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.state_mut().live.len()
    }

    /// The most recent submit record, if any.
    #[must_use]
    pub fn last_submit(&self) -> Option<SubmitArgs> {
        self.state_mut().last_submit
    }

    fn state_mut(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("host transport state poisoned")
    }
}

impl AccelTransport for HostTransport {
    fn alloc(&self, size: u64) -> Result<BoDesc> {
        if size == 0 {
            return Err(AneError::invalid_argument("zero-sized allocation"));
        }

        let mut state = self.state_mut();
        if let Some(left) = state.allocs_left.as_mut() {
            if *left == 0 {
                return Err(AneError::allocation(size, "allocation budget exhausted"));
            }
            *left -= 1;
        }

        state.next_handle += 1;
        let handle = state.next_handle;
        let offset = state.next_offset;
        state.next_offset += tile::tile_align(size);
        state.live.insert(handle, size);

        Ok(BoDesc { handle, offset })
    }

    fn map(&self, bo: BoDesc, size: u64) -> Result<Mapping> {
        let state = self.state_mut();
        match state.live.get(&bo.handle) {
            Some(&alloc_size) if alloc_size == size => {}
            Some(&alloc_size) => {
                return Err(AneError::device(format!(
                    "mapping size {size:#x} != allocated {alloc_size:#x}"
                )))
            }
            None => {
                return Err(AneError::device(format!(
                    "mapping unknown handle {}",
                    bo.handle
                )))
            }
        }

        let len = usize::try_from(size)
            .map_err(|_| AneError::invalid_argument("mapping size overflows usize"))?;
        Ok(Mapping::Host(vec![0u8; len].into_boxed_slice()))
    }

    fn free(&self, handle: u32) -> Result<()> {
        if self.state_mut().live.remove(&handle).is_none() {
            return Err(AneError::device(format!("freeing unknown handle {handle}")));
        }
        Ok(())
    }

    fn submit(&self, args: &SubmitArgs) -> Result<()> {
        let mut state = self.state_mut();
        for &handle in args.handles.iter().chain([&args.btsp_handle]) {
            if handle != 0 && !state.live.contains_key(&handle) {
                return Err(AneError::device(format!(
                    "submit references dead handle {handle}"
                )));
            }
        }
        state.last_submit = Some(*args);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_tracks_live_set() {
        let t = HostTransport::new();
        let a = t.alloc(0x4000).unwrap();
        let b = t.alloc(0x8000).unwrap();
        assert_ne!(a.handle, b.handle);
        assert_eq!(t.live_allocations(), 2);

        t.free(a.handle).unwrap();
        assert_eq!(t.live_allocations(), 1);
        assert!(t.free(a.handle).is_err());
    }

    #[test]
    fn zero_sized_alloc_is_invalid() {
        let t = HostTransport::new();
        assert!(matches!(
            t.alloc(0),
            Err(AneError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn alloc_limit_fails_afterwards() {
        let t = HostTransport::with_alloc_limit(1);
        assert!(t.alloc(0x4000).is_ok());
        assert!(matches!(
            t.alloc(0x4000),
            Err(AneError::Allocation { .. })
        ));
    }

    #[test]
    fn map_checks_handle_and_size() {
        let t = HostTransport::new();
        let bo = t.alloc(0x4000).unwrap();
        assert!(t.map(bo, 0x4000).is_ok());
        assert!(t.map(bo, 0x8000).is_err());
        assert!(t
            .map(BoDesc { handle: 99, offset: 0 }, 0x4000)
            .is_err());
    }
}
