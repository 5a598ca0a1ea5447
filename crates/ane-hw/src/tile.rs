//! Tile geometry and the fixed slot layout.
//!
//! The engine's memory is managed in 16 KiB tiles. A compiled network
//! describes every buffer it needs as a *tile-size code*: the number of
//! 16 KiB tiles in that buffer. Codes live in a fixed 32-entry slot array;
//! the slot index doubles as the buffer's identity in the submit record.
//!
//! Slot layout:
//!
//! ```text
//! 0            weights / payload image
//! 1..4         fixed-function (intermediates, krn)
//! 4..4+dst     destination (output) channels
//! 4+dst..      source (input) channels
//! ```

/// log2 of the hardware tile size.
pub const TILE_SHIFT: u32 = 14;

/// Hardware tile (page) size in bytes: 16 KiB.
pub const TILE_SIZE: u64 = 1 << TILE_SHIFT;

/// Number of entries in the tile-slot array.
pub const SLOT_COUNT: usize = 32;

/// Slots below this index are fixed-function.
pub const FIXED_SLOTS: usize = 4;

/// Slot holding the full model payload image.
pub const WEIGHT_SLOT: usize = 0;

/// Tensor element size in bytes (fp16 / bf16).
pub const ELEM_SIZE: usize = 2;

/// Default network identifier stamped into the bootstrap task descriptor.
pub const FIFO_NID: u8 = 0x40;

/// Convert a tile-size code to a byte size.
#[must_use]
pub const fn tile_shift(code: u32) -> u64 {
    (code as u64) << TILE_SHIFT
}

/// Round a byte size up to the next tile boundary.
#[must_use]
pub const fn tile_align(size: u64) -> u64 {
    (size + TILE_SIZE - 1) & !(TILE_SIZE - 1)
}

/// First destination slot.
#[must_use]
pub const fn dst_slot(idx: usize) -> usize {
    FIXED_SLOTS + idx
}

/// First source slot comes after all destination slots.
#[must_use]
pub const fn src_slot(dst_count: usize, idx: usize) -> usize {
    FIXED_SLOTS + dst_count + idx
}
