//! Network instances: a model bound to a device, plus execution.
//!
//! Binding allocates the full channel set; the instance is then the unit
//! of repeated execution. Everything here runs synchronously on the
//! calling thread and performs no locking — sharing one instance across
//! threads requires external synchronization.

use ane_hw::tile::{self, FIFO_NID};
use ane_hw::uapi::SubmitArgs;

use crate::channel::ChannelSet;
use crate::device::AneDevice;
use crate::error::{AneError, Result};
use crate::model::Model;
use crate::tiling;

/// A live binding of a loaded model to a device session.
#[derive(Debug)]
pub struct NetworkInstance {
    device: AneDevice,
    model: Model,
    // Present from bind until drop; Option only so teardown can take it.
    chans: Option<ChannelSet>,
    scratch: Vec<u8>,
}

impl NetworkInstance {
    /// Bind a model to a device with the default network identifier.
    ///
    /// # Errors
    ///
    /// Channel allocation is all-or-nothing: on error, no channel of this
    /// instance remains allocated.
    pub fn bind(device: AneDevice, model: Model) -> Result<Self> {
        Self::bind_with_nid(device, model, FIFO_NID)
    }

    /// Bind with an explicit network identifier, stamped into bits 16–23
    /// of the bootstrap control word.
    ///
    /// # Errors
    ///
    /// As [`Self::bind`].
    pub fn bind_with_nid(device: AneDevice, model: Model, nid: u8) -> Result<Self> {
        let chans = ChannelSet::init(
            device.transport(),
            model.descriptor(),
            model.payload(),
            nid,
        )?;

        tracing::info!(
            "bound network: {} src / {} dst channel(s), nid {nid:#x}",
            model.descriptor().src_count(),
            model.descriptor().dst_count()
        );

        Ok(Self {
            device,
            model,
            chans: Some(chans),
            scratch: Vec::new(),
        })
    }

    /// Load a model file and bind it to the `dev_id`-th device.
    ///
    /// # Errors
    ///
    /// Any load, open, or bind failure; nothing is left allocated.
    pub fn from_file<P: AsRef<std::path::Path>>(path: P, dev_id: usize) -> Result<Self> {
        let model = Model::load(path)?;
        let device = AneDevice::open(dev_id)?;
        Self::bind(device, model)
    }

    /// Execute the network once, blocking until the device reports
    /// completion or failure.
    ///
    /// # Errors
    ///
    /// The device's failure code, verbatim. No retry, and no partial
    /// submission state exists either way.
    pub fn exec(&mut self) -> Result<()> {
        let desc = self.model.descriptor();
        let chans = self.chans();

        let mut args = SubmitArgs {
            tsk_size: u64::from(desc.tsk_size()),
            td_size: desc.td_size(),
            td_count: desc.td_count(),
            ..SubmitArgs::default()
        };
        for slot in 0..tile::SLOT_COUNT {
            if let Some(chan) = chans.slot(slot) {
                args.handles[slot] = chan.handle();
            }
        }
        args.btsp_handle = chans.bootstrap().handle();

        self.device.transport().submit(&args)
    }

    /// Number of source (input) channels.
    #[must_use]
    pub fn src_count(&self) -> u32 {
        self.model.descriptor().src_count()
    }

    /// Number of destination (output) channels.
    #[must_use]
    pub fn dst_count(&self) -> u32 {
        self.model.descriptor().dst_count()
    }

    /// Copy `data` into the `idx`-th source channel, no layout transform.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range or `data`
    /// is not exactly the channel's tile size.
    pub fn send(&mut self, data: &[u8], idx: u32) -> Result<()> {
        let slot = self.src_slot(idx)?;
        let chan = self.chan_mut(slot);
        if data.len() as u64 != chan.size() {
            return Err(AneError::invalid_argument(format!(
                "source {idx} takes {:#x} bytes, got {:#x}",
                chan.size(),
                data.len()
            )));
        }
        chan.as_mut_slice().copy_from_slice(data);
        Ok(())
    }

    /// Copy the `idx`-th destination channel into `out`, no transform.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range or `out`
    /// is not exactly the channel's tile size.
    pub fn read(&self, out: &mut [u8], idx: u32) -> Result<()> {
        let slot = self.dst_slot(idx)?;
        let chan = self.chan(slot);
        if out.len() as u64 != chan.size() {
            return Err(AneError::invalid_argument(format!(
                "destination {idx} yields {:#x} bytes, got {:#x}",
                chan.size(),
                out.len()
            )));
        }
        out.copy_from_slice(chan.as_slice());
        Ok(())
    }

    /// Copy a full tile-size buffer into a source channel with no index
    /// or length validation.
    ///
    /// # Safety
    ///
    /// `idx` must be below [`Self::src_count`] and `data` must hold at
    /// least the channel's tile size; otherwise memory access is
    /// undefined. This is the performance path — prefer [`Self::send`].
    pub unsafe fn send_unchecked(&mut self, data: &[u8], idx: u32) {
        let slot = tile::src_slot(self.dst_count() as usize, idx as usize);
        let chan = self.chan_mut(slot);
        let size = chan.size() as usize;
        // SAFETY: caller guarantees data covers `size` bytes; the channel
        // mapping is exactly `size` bytes and exclusively borrowed.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                chan.as_mut_slice().as_mut_ptr(),
                size,
            );
        }
    }

    /// Copy a destination channel out with no index or length validation.
    ///
    /// # Safety
    ///
    /// `idx` must be below [`Self::dst_count`] and `out` must have
    /// capacity for the channel's tile size; otherwise memory access is
    /// undefined. Prefer [`Self::read`].
    pub unsafe fn read_unchecked(&self, out: &mut [u8], idx: u32) {
        let slot = tile::dst_slot(idx as usize);
        let chan = self.chan(slot);
        let size = chan.size() as usize;
        // SAFETY: caller guarantees out covers `size` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(
                chan.as_slice().as_ptr(),
                out.as_mut_ptr(),
                size,
            );
        }
    }

    /// Tile a logical `[N, C, H, W]` tensor into the `idx`-th source
    /// channel using the slot's descriptor shape.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range or `data`
    /// does not match the shape's logical size.
    pub fn send_tiled(&mut self, data: &[u8], idx: u32) -> Result<()> {
        let slot = self.src_slot(idx)?;
        let shape = *self.model.descriptor().shape(slot);

        let chans = self.chans.as_mut().expect("channel set present until drop");
        let chan = chans.slot_mut(slot).expect("i/o slot populated");

        // Reused scratch, fully zeroed so tile padding is deterministic.
        self.scratch.clear();
        self.scratch.resize(chan.size() as usize, 0);
        tiling::tile(data, &mut self.scratch, &shape)?;

        chan.as_mut_slice().copy_from_slice(&self.scratch);
        Ok(())
    }

    /// Untile the `idx`-th destination channel into a logical tensor.
    /// `out` is zero-filled first.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range or `out`
    /// does not match the shape's logical size.
    pub fn read_tiled(&mut self, out: &mut [u8], idx: u32) -> Result<()> {
        let slot = self.dst_slot(idx)?;
        let shape = *self.model.descriptor().shape(slot);

        let chans = self.chans.as_ref().expect("channel set present until drop");
        let chan = chans.slot(slot).expect("i/o slot populated");

        self.scratch.clear();
        self.scratch.extend_from_slice(chan.as_slice());
        tiling::untile(&self.scratch, out, &shape)
    }

    /// The `idx`-th source channel's mapped bytes.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range.
    pub fn src_chan(&self, idx: u32) -> Result<&[u8]> {
        Ok(self.chan(self.src_slot(idx)?).as_slice())
    }

    /// The `idx`-th source channel's mapped bytes, mutably.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range.
    pub fn src_chan_mut(&mut self, idx: u32) -> Result<&mut [u8]> {
        let slot = self.src_slot(idx)?;
        Ok(self.chan_mut(slot).as_mut_slice())
    }

    /// The `idx`-th destination channel's mapped bytes.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range.
    pub fn dst_chan(&self, idx: u32) -> Result<&[u8]> {
        Ok(self.chan(self.dst_slot(idx)?).as_slice())
    }

    /// The `idx`-th destination channel's mapped bytes, mutably.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range.
    pub fn dst_chan_mut(&mut self, idx: u32) -> Result<&mut [u8]> {
        let slot = self.dst_slot(idx)?;
        Ok(self.chan_mut(slot).as_mut_slice())
    }

    /// Tile size of the `idx`-th source channel.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range.
    pub fn src_size(&self, idx: u32) -> Result<u64> {
        Ok(self.chan(self.src_slot(idx)?).size())
    }

    /// Tile size of the `idx`-th destination channel.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `idx` is out of range.
    pub fn dst_size(&self, idx: u32) -> Result<u64> {
        Ok(self.chan(self.dst_slot(idx)?).size())
    }

    /// The bootstrap channel's mapped bytes (staged task descriptor).
    #[must_use]
    pub fn bootstrap_chan(&self) -> &[u8] {
        self.chans().bootstrap().as_slice()
    }

    /// The bound model.
    #[must_use]
    pub const fn model(&self) -> &Model {
        &self.model
    }

    /// The underlying device session.
    #[must_use]
    pub fn device(&self) -> &AneDevice {
        &self.device
    }

    fn chans(&self) -> &ChannelSet {
        self.chans.as_ref().expect("channel set present until drop")
    }

    fn chan(&self, slot: usize) -> &crate::channel::Channel {
        self.chans().slot(slot).expect("i/o slot populated")
    }

    fn chan_mut(&mut self, slot: usize) -> &mut crate::channel::Channel {
        self.chans
            .as_mut()
            .expect("channel set present until drop")
            .slot_mut(slot)
            .expect("i/o slot populated")
    }

    fn src_slot(&self, idx: u32) -> Result<usize> {
        self.model.descriptor().src_slot(idx).ok_or_else(|| {
            AneError::invalid_argument(format!(
                "source index {idx} out of range (count {})",
                self.src_count()
            ))
        })
    }

    fn dst_slot(&self, idx: u32) -> Result<usize> {
        self.model.descriptor().dst_slot(idx).ok_or_else(|| {
            AneError::invalid_argument(format!(
                "destination index {idx} out of range (count {})",
                self.dst_count()
            ))
        })
    }
}

impl Drop for NetworkInstance {
    fn drop(&mut self) {
        tracing::info!("releasing network instance");
        if let Some(chans) = self.chans.take() {
            chans.release(self.device.transport());
        }
    }
}
