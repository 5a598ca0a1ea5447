//! Channel set management.
//!
//! One memory-mapped channel per populated tile slot, plus the bootstrap
//! channel carrying the task descriptor. Initialization is all-or-nothing:
//! a failure at any point releases everything allocated so far, so a
//! network instance either holds a complete channel set or none.

use ane_hw::tile;

use crate::descriptor::Descriptor;
use crate::error::{AneError, Result};
use crate::transport::{AccelTransport, Mapping};

/// One mapped, kernel-backed buffer. Mapped size always equals the
/// declared size.
#[derive(Debug)]
pub struct Channel {
    handle: u32,
    size: u64,
    map: Mapping,
}

impl Channel {
    fn init(transport: &dyn AccelTransport, size: u64) -> Result<Self> {
        if size == 0 {
            return Err(AneError::invalid_argument("zero-sized channel"));
        }

        let bo = transport.alloc(size)?;
        let map = match transport.map(bo, size) {
            Ok(map) => map,
            Err(e) => {
                // The handle exists but was never mapped; release it so
                // the failed channel leaves nothing behind.
                if let Err(free_err) = transport.free(bo.handle) {
                    tracing::error!("freeing unmapped channel failed: {free_err}");
                }
                return Err(e);
            }
        };

        Ok(Self {
            handle: bo.handle,
            size,
            map,
        })
    }

    fn release(self, transport: &dyn AccelTransport) {
        let handle = self.handle;
        drop(self.map);
        if let Err(e) = transport.free(handle) {
            tracing::error!("freeing channel handle {handle} failed: {e}");
        }
    }

    /// Kernel handle, as referenced by the submit record.
    #[must_use]
    pub const fn handle(&self) -> u32 {
        self.handle
    }

    /// Declared (and mapped) size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// The mapped region.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.map.as_slice()
    }

    /// The mapped region, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.map.as_mut_slice()
    }
}

/// The complete channel set of one network instance.
#[derive(Debug)]
pub struct ChannelSet {
    slots: [Option<Channel>; tile::SLOT_COUNT],
    bootstrap: Channel,
}

impl ChannelSet {
    /// Allocate, map, and prime every channel a descriptor declares.
    ///
    /// On success the set holds one channel per populated slot and the
    /// bootstrap channel, with the payload image staged in slot 0, the
    /// task descriptor staged in the bootstrap channel, and `nid` stamped
    /// into the bootstrap control word.
    ///
    /// # Errors
    ///
    /// Any allocation or mapping failure unwinds every channel allocated
    /// so far for this set before returning.
    pub fn init(
        transport: &dyn AccelTransport,
        desc: &Descriptor,
        payload: &[u8],
        nid: u8,
    ) -> Result<Self> {
        let mut slots: [Option<Channel>; tile::SLOT_COUNT] =
            std::array::from_fn(|_| None);

        let release_slots = |slots: &mut [Option<Channel>]| {
            for chan in slots.iter_mut().filter_map(Option::take) {
                chan.release(transport);
            }
        };

        for slot in 0..tile::SLOT_COUNT {
            if !desc.is_populated(slot) {
                continue;
            }
            match Channel::init(transport, desc.tile_bytes(slot)) {
                Ok(chan) => slots[slot] = Some(chan),
                Err(e) => {
                    tracing::warn!("channel init for slot {slot} failed: {e}");
                    release_slots(&mut slots);
                    return Err(e);
                }
            }
        }

        let bootstrap =
            match Channel::init(transport, tile::tile_align(desc.td_size())) {
                Ok(chan) => chan,
                Err(e) => {
                    tracing::warn!("bootstrap channel init failed: {e}");
                    release_slots(&mut slots);
                    return Err(e);
                }
            };

        let mut set = Self { slots, bootstrap };
        set.prime(desc, payload, nid);
        Ok(set)
    }

    /// Stage the payload image and the stamped task descriptor.
    ///
    /// Sizes were validated at descriptor parse: the payload fits slot 0
    /// and `td_size` is within both the payload and the bootstrap channel.
    fn prime(&mut self, desc: &Descriptor, payload: &[u8], nid: u8) {
        let weights = self.slots[tile::WEIGHT_SLOT]
            .as_mut()
            .expect("slot 0 populated by descriptor validation");
        weights.as_mut_slice()[..payload.len()].copy_from_slice(payload);

        let td_size = usize::try_from(desc.td_size())
            .expect("td_size validated against MAX_PAYLOAD");
        let btsp = self.bootstrap.as_mut_slice();
        btsp[..td_size].copy_from_slice(&payload[..td_size]);

        set_nid(btsp, nid);
    }

    /// Release every channel. Safe on any state; errors are logged, not
    /// propagated, so teardown always runs to completion.
    pub fn release(mut self, transport: &dyn AccelTransport) {
        for chan in self.slots.iter_mut().filter_map(Option::take) {
            chan.release(transport);
        }
        self.bootstrap.release(transport);
    }

    /// Channel for a slot, if populated.
    #[must_use]
    pub fn slot(&self, slot: usize) -> Option<&Channel> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Mutable channel for a slot, if populated.
    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut Channel> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// The bootstrap (task descriptor) channel.
    #[must_use]
    pub const fn bootstrap(&self) -> &Channel {
        &self.bootstrap
    }
}

/// Replace bits 16–23 of the buffer's first little-endian u32 with `nid`,
/// preserving every other bit.
fn set_nid(td: &mut [u8], nid: u8) {
    let mut word = u32::from_le_bytes(td[..4].try_into().expect("4-byte slice"));
    word = (word & !0x00ff_0000) | (u32::from(nid) << 16);
    td[..4].copy_from_slice(&word.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nid_stamp_touches_only_bits_16_to_23() {
        let mut td = 0xdead_beefu32.to_le_bytes().to_vec();
        td.extend_from_slice(&[0x11; 4]);

        set_nid(&mut td, 0x40);

        let word = u32::from_le_bytes(td[..4].try_into().unwrap());
        assert_eq!((word >> 16) & 0xff, 0x40);
        assert_eq!(word & 0xffff, 0xbeef);
        assert_eq!(word >> 24, 0xde);
        assert_eq!(&td[4..], &[0x11; 4]);
    }
}
