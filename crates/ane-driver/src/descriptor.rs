//! Network descriptor parsing and validation.
//!
//! A compiled network ships as a fixed 4096-byte header followed by the
//! payload blob. Every header field that later drives an allocation or a
//! memory-copy size is range-checked here, once, so the rest of the crate
//! can trust the `Descriptor` it holds. An untrusted file can make `parse`
//! fail; it cannot make a downstream copy run out of bounds.
//!
//! # Header layout (little-endian)
//!
//! | Offset | Type          | Field |
//! |--------|---------------|-------|
//! | 0x00   | u64           | payload size |
//! | 0x08   | u64           | task-descriptor size |
//! | 0x10   | u32           | task-descriptor count |
//! | 0x14   | u32           | total task size |
//! | 0x18   | u32           | source channel count |
//! | 0x1c   | u32           | destination channel count |
//! | 0x20   | [u32; 32]     | per-slot tile-size codes |
//! | 0xa0   | [[u64; 6]; 32]| per-slot N, C, H, W, page, row stride |
//!
//! The remainder of the header is reserved.

use ane_hw::tile::{self, ELEM_SIZE, FIXED_SLOTS, SLOT_COUNT};

use crate::error::{AneError, Result};

/// Fixed descriptor header size in bytes.
pub const HEADER_SIZE: usize = 4096;

/// Upper bound accepted for the payload blob (1 GiB).
pub const MAX_PAYLOAD: u64 = 1 << 30;

/// Upper bound accepted for a single tile-size code (1 GiB channel).
pub const MAX_TILE_CODE: u32 = 1 << 16;

const OFF_SIZE: usize = 0x00;
const OFF_TD_SIZE: usize = 0x08;
const OFF_TD_COUNT: usize = 0x10;
const OFF_TSK_SIZE: usize = 0x14;
const OFF_SRC_COUNT: usize = 0x18;
const OFF_DST_COUNT: usize = 0x1c;
const OFF_TILES: usize = 0x20;
const OFF_SHAPES: usize = 0xa0;

/// Logical/tiled geometry of one channel, straight from the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileShape {
    /// Batch dimension.
    pub n: u64,
    /// Channel dimension.
    pub c: u64,
    /// Height (logical rows).
    pub h: u64,
    /// Width (logical row length in elements).
    pub w: u64,
    /// Hardware page size in bytes.
    pub page: u64,
    /// Tile row stride in bytes.
    pub stride: u64,
}

impl TileShape {
    /// Rows per tile plane, `page / stride`.
    #[must_use]
    pub const fn tile_rows(&self) -> u64 {
        self.page / self.stride
    }

    /// Elements per tile row, `stride / 2`.
    #[must_use]
    pub const fn tile_row_elems(&self) -> u64 {
        self.stride / ELEM_SIZE as u64
    }

    /// Size of the logical row-major tensor in bytes.
    #[must_use]
    pub fn logical_bytes(&self) -> u64 {
        self.n * self.c * self.h * self.w * ELEM_SIZE as u64
    }

    /// Size of the tiled representation in bytes,
    /// `N * C * tile_rows * tile_row_elems * 2 = N * C * page`.
    #[must_use]
    pub fn tiled_bytes(&self) -> u64 {
        self.n * self.c * self.page
    }

    /// Check internal consistency against the slot's declared tile size.
    fn validate(&self, slot: usize, tile_bytes: u64) -> Result<()> {
        let fields = [self.n, self.c, self.h, self.w, self.page, self.stride];
        if fields.contains(&0) {
            return Err(AneError::descriptor(format!(
                "slot {slot}: zero shape field in {self:?}"
            )));
        }
        if self.stride % ELEM_SIZE as u64 != 0 || self.page % self.stride != 0 {
            return Err(AneError::descriptor(format!(
                "slot {slot}: page {:#x} not a multiple of stride {:#x}",
                self.page, self.stride
            )));
        }
        if self.h > self.tile_rows() {
            return Err(AneError::descriptor(format!(
                "slot {slot}: H {} exceeds tile rows {}",
                self.h,
                self.tile_rows()
            )));
        }
        let row_bytes = self.w.checked_mul(ELEM_SIZE as u64);
        if row_bytes.is_none() || row_bytes > Some(self.stride) {
            return Err(AneError::descriptor(format!(
                "slot {slot}: W {} exceeds tile row of {} elements",
                self.w,
                self.tile_row_elems()
            )));
        }

        // Checked products: these feed copy lengths and scratch sizes.
        let tiled = self
            .n
            .checked_mul(self.c)
            .and_then(|x| x.checked_mul(self.page))
            .ok_or_else(|| {
                AneError::descriptor(format!("slot {slot}: tiled size overflows"))
            })?;
        self.n
            .checked_mul(self.c)
            .and_then(|x| x.checked_mul(self.h))
            .and_then(|x| x.checked_mul(self.w))
            .and_then(|x| x.checked_mul(ELEM_SIZE as u64))
            .ok_or_else(|| {
                AneError::descriptor(format!("slot {slot}: logical size overflows"))
            })?;

        if tiled != tile_bytes {
            return Err(AneError::descriptor(format!(
                "slot {slot}: tiled size {tiled:#x} != declared tile size {tile_bytes:#x}"
            )));
        }

        Ok(())
    }
}

/// Validated network descriptor header.
#[derive(Debug, Clone)]
pub struct Descriptor {
    payload_size: u64,
    td_size: u64,
    td_count: u32,
    tsk_size: u32,
    src_count: u32,
    dst_count: u32,
    tiles: [u32; SLOT_COUNT],
    shapes: [TileShape; SLOT_COUNT],
}

impl Descriptor {
    /// Parse and validate a descriptor header.
    ///
    /// # Errors
    ///
    /// Returns [`AneError::Descriptor`] if the buffer is shorter than
    /// [`HEADER_SIZE`] or any field fails its range check.
    pub fn parse(header: &[u8]) -> Result<Self> {
        if header.len() < HEADER_SIZE {
            return Err(AneError::descriptor(format!(
                "header is {} bytes, need {HEADER_SIZE}",
                header.len()
            )));
        }

        let payload_size = read_u64(header, OFF_SIZE);
        let td_size = read_u64(header, OFF_TD_SIZE);
        let td_count = read_u32(header, OFF_TD_COUNT);
        let tsk_size = read_u32(header, OFF_TSK_SIZE);
        let src_count = read_u32(header, OFF_SRC_COUNT);
        let dst_count = read_u32(header, OFF_DST_COUNT);

        if payload_size == 0 || payload_size > MAX_PAYLOAD {
            return Err(AneError::descriptor(format!(
                "payload size {payload_size:#x} out of range (0, {MAX_PAYLOAD:#x}]"
            )));
        }
        if td_size == 0 || td_size > payload_size {
            return Err(AneError::descriptor(format!(
                "task descriptor size {td_size:#x} out of range (0, {payload_size:#x}]"
            )));
        }
        if td_count == 0 {
            return Err(AneError::descriptor("task descriptor count is zero"));
        }
        if tsk_size == 0 || u64::from(tsk_size) > payload_size {
            return Err(AneError::descriptor(format!(
                "task size {tsk_size:#x} out of range (0, {payload_size:#x}]"
            )));
        }

        let io_slots = (src_count as usize)
            .checked_add(dst_count as usize)
            .and_then(|x| x.checked_add(FIXED_SLOTS))
            .filter(|&x| x <= SLOT_COUNT)
            .ok_or_else(|| {
                AneError::descriptor(format!(
                    "src {src_count} + dst {dst_count} channels exceed {} slots",
                    SLOT_COUNT - FIXED_SLOTS
                ))
            })?;

        let mut tiles = [0u32; SLOT_COUNT];
        for (slot, code) in tiles.iter_mut().enumerate() {
            *code = read_u32(header, OFF_TILES + slot * 4);
            if *code > MAX_TILE_CODE {
                return Err(AneError::descriptor(format!(
                    "slot {slot}: tile code {code:#x} exceeds {MAX_TILE_CODE:#x}",
                    code = *code
                )));
            }
        }

        if tiles[tile::WEIGHT_SLOT] == 0 {
            return Err(AneError::descriptor("weight slot 0 is unpopulated"));
        }
        if tile::tile_shift(tiles[tile::WEIGHT_SLOT]) < payload_size {
            return Err(AneError::descriptor(format!(
                "weight slot holds {:#x} bytes, payload is {payload_size:#x}",
                tile::tile_shift(tiles[tile::WEIGHT_SLOT])
            )));
        }

        let mut shapes = [TileShape::default(); SLOT_COUNT];
        for (slot, shape) in shapes.iter_mut().enumerate() {
            let base = OFF_SHAPES + slot * 6 * 8;
            *shape = TileShape {
                n: read_u64(header, base),
                c: read_u64(header, base + 8),
                h: read_u64(header, base + 16),
                w: read_u64(header, base + 24),
                page: read_u64(header, base + 32),
                stride: read_u64(header, base + 40),
            };
        }

        // Source/destination channels must be fully described: their
        // shapes drive the tiling transform and scratch allocation.
        for slot in FIXED_SLOTS..io_slots {
            if tiles[slot] == 0 {
                return Err(AneError::descriptor(format!(
                    "i/o slot {slot} is unpopulated"
                )));
            }
            shapes[slot].validate(slot, tile::tile_shift(tiles[slot]))?;
        }

        Ok(Self {
            payload_size,
            td_size,
            td_count,
            tsk_size,
            src_count,
            dst_count,
            tiles,
            shapes,
        })
    }

    /// Declared payload blob size in bytes.
    #[must_use]
    pub const fn payload_size(&self) -> u64 {
        self.payload_size
    }

    /// Size of one task descriptor in bytes.
    #[must_use]
    pub const fn td_size(&self) -> u64 {
        self.td_size
    }

    /// Number of task descriptors.
    #[must_use]
    pub const fn td_count(&self) -> u32 {
        self.td_count
    }

    /// Total task size in bytes.
    #[must_use]
    pub const fn tsk_size(&self) -> u32 {
        self.tsk_size
    }

    /// Number of source (input) channels.
    #[must_use]
    pub const fn src_count(&self) -> u32 {
        self.src_count
    }

    /// Number of destination (output) channels.
    #[must_use]
    pub const fn dst_count(&self) -> u32 {
        self.dst_count
    }

    /// Whether a slot has a buffer declared.
    #[must_use]
    pub const fn is_populated(&self, slot: usize) -> bool {
        self.tiles[slot] != 0
    }

    /// Declared byte size of a slot's buffer.
    #[must_use]
    pub const fn tile_bytes(&self, slot: usize) -> u64 {
        tile::tile_shift(self.tiles[slot])
    }

    /// Shape metadata for a slot.
    #[must_use]
    pub const fn shape(&self, slot: usize) -> &TileShape {
        &self.shapes[slot]
    }

    /// Slot index of the `idx`-th source channel, if in range.
    #[must_use]
    pub fn src_slot(&self, idx: u32) -> Option<usize> {
        (idx < self.src_count)
            .then(|| tile::src_slot(self.dst_count as usize, idx as usize))
    }

    /// Slot index of the `idx`-th destination channel, if in range.
    #[must_use]
    pub fn dst_slot(&self, idx: u32) -> Option<usize> {
        (idx < self.dst_count).then(|| tile::dst_slot(idx as usize))
    }
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().expect("4-byte slice"))
}

fn read_u64(buf: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(buf[off..off + 8].try_into().expect("8-byte slice"))
}
