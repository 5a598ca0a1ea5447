//! Tiling transform between logical tensors and hardware tile layout.
//!
//! The engine stores a logical `[N, C, H, W]` row-major tensor of 2-byte
//! elements in planes of `page / stride` rows by `stride / 2` elements.
//! Converting is pure data movement: one contiguous W-element row copy per
//! `(n, c, h)`, with the tile geometry replacing `H`/`W` as the minor
//! strides on the tiled side. No values are computed or converted.
//!
//! `tile` leaves padding columns and rows untouched — pre-zero the
//! destination for deterministic output. `untile` zero-fills its
//! destination first, so padding always reads back as zero.
//!
//! Buffer lengths are validated up front; nothing is copied on mismatch.
//! The per-row copies themselves are the per-inference hot path.

use ane_hw::tile::ELEM_SIZE;

use crate::descriptor::TileShape;
use crate::error::{AneError, Result};

/// Validated copy geometry in usize, derived once per call.
struct Geometry {
    n: usize,
    c: usize,
    h: usize,
    row_bytes: usize,
    logical_row: usize,
    logical_plane: usize,
    tiled_row: usize,
    tiled_plane: usize,
    logical_bytes: usize,
    tiled_bytes: usize,
}

impl Geometry {
    fn new(shape: &TileShape) -> Result<Self> {
        let bad = |reason: String| AneError::InvalidArgument { reason };

        let fields = [shape.n, shape.c, shape.h, shape.w, shape.page, shape.stride];
        if fields.contains(&0) {
            return Err(bad(format!("zero field in shape {shape:?}")));
        }
        if shape.stride % ELEM_SIZE as u64 != 0 || shape.page % shape.stride != 0 {
            return Err(bad(format!(
                "page {:#x} / stride {:#x} not tile-divisible",
                shape.page, shape.stride
            )));
        }
        if shape.h > shape.tile_rows() || shape.w > shape.tile_row_elems() {
            return Err(bad(format!(
                "{}x{} tensor exceeds {}x{} tile plane",
                shape.h,
                shape.w,
                shape.tile_rows(),
                shape.tile_row_elems()
            )));
        }

        let to_usize = |v: u64, what: &str| -> Result<usize> {
            usize::try_from(v).map_err(|_| bad(format!("{what} overflows usize")))
        };

        let n = to_usize(shape.n, "N")?;
        let c = to_usize(shape.c, "C")?;
        let h = to_usize(shape.h, "H")?;
        let w = to_usize(shape.w, "W")?;
        let tiled_row = to_usize(shape.tile_row_elems(), "tile row")?;
        let tiled_plane = tiled_row
            .checked_mul(to_usize(shape.tile_rows(), "tile rows")?)
            .ok_or_else(|| bad("tile plane overflows usize".into()))?;

        let logical_row = w;
        let logical_plane = h
            .checked_mul(w)
            .ok_or_else(|| bad("logical plane overflows usize".into()))?;

        let elems = |plane: usize| -> Result<usize> {
            n.checked_mul(c)
                .and_then(|x| x.checked_mul(plane))
                .and_then(|x| x.checked_mul(ELEM_SIZE))
                .ok_or_else(|| bad("tensor size overflows usize".into()))
        };

        // Totals first: once these fit in usize, every per-plane and
        // per-row product below is smaller and cannot overflow.
        let logical_bytes = elems(logical_plane)?;
        let tiled_bytes = elems(tiled_plane)?;

        Ok(Self {
            n,
            c,
            h,
            row_bytes: w * ELEM_SIZE,
            logical_row: logical_row * ELEM_SIZE,
            logical_plane: logical_plane * ELEM_SIZE,
            tiled_row: tiled_row * ELEM_SIZE,
            tiled_plane: tiled_plane * ELEM_SIZE,
            logical_bytes,
            tiled_bytes,
        })
    }

    fn check_lens(&self, logical: usize, tiled: usize) -> Result<()> {
        if logical != self.logical_bytes {
            return Err(AneError::invalid_argument(format!(
                "logical buffer is {logical:#x} bytes, shape needs {:#x}",
                self.logical_bytes
            )));
        }
        if tiled != self.tiled_bytes {
            return Err(AneError::invalid_argument(format!(
                "tiled buffer is {tiled:#x} bytes, shape needs {:#x}",
                self.tiled_bytes
            )));
        }
        Ok(())
    }

    /// Visit each row as (logical offset, tiled offset).
    fn for_each_row(&self, mut f: impl FnMut(usize, usize)) {
        for nc in 0..self.n * self.c {
            let logical_base = nc * self.logical_plane;
            let tiled_base = nc * self.tiled_plane;
            for h in 0..self.h {
                f(logical_base + h * self.logical_row, tiled_base + h * self.tiled_row);
            }
        }
    }
}

/// Copy a logical row-major tensor into tile layout.
///
/// Padding regions of `dst` are not written.
///
/// # Errors
///
/// [`AneError::InvalidArgument`] if the shape is inconsistent or either
/// buffer length differs from what the shape requires.
pub fn tile(src: &[u8], dst: &mut [u8], shape: &TileShape) -> Result<()> {
    let geo = Geometry::new(shape)?;
    geo.check_lens(src.len(), dst.len())?;

    geo.for_each_row(|logical, tiled| {
        dst[tiled..tiled + geo.row_bytes]
            .copy_from_slice(&src[logical..logical + geo.row_bytes]);
    });
    Ok(())
}

/// Copy a tiled buffer back into a logical row-major tensor.
///
/// `dst` is zero-filled first; regions the inverse mapping does not touch
/// read as zero.
///
/// # Errors
///
/// [`AneError::InvalidArgument`] if the shape is inconsistent or either
/// buffer length differs from what the shape requires.
pub fn untile(src: &[u8], dst: &mut [u8], shape: &TileShape) -> Result<()> {
    let geo = Geometry::new(shape)?;
    geo.check_lens(dst.len(), src.len())?;

    dst.fill(0);
    geo.for_each_row(|logical, tiled| {
        dst[logical..logical + geo.row_bytes]
            .copy_from_slice(&src[tiled..tiled + geo.row_bytes]);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(n: u64, c: u64, h: u64, w: u64, page: u64, stride: u64) -> TileShape {
        TileShape { n, c, h, w, page, stride }
    }

    fn logical_of(shape: &TileShape) -> Vec<u8> {
        // Distinct 2-byte elements so any misplacement shows up.
        let elems = (shape.n * shape.c * shape.h * shape.w) as usize;
        (0..elems)
            .flat_map(|i| (i as u16).wrapping_add(1).to_le_bytes())
            .collect()
    }

    #[test]
    fn round_trip_is_bit_exact() {
        // 2x3x5x7 fp16 in 0x4000 pages of 0x100 stride: 64x128 tile plane.
        let s = shape(2, 3, 5, 7, 0x4000, 0x100);
        let data = logical_of(&s);

        let mut tiled = vec![0u8; s.tiled_bytes() as usize];
        tile(&data, &mut tiled, &s).unwrap();

        let mut back = vec![0xffu8; data.len()];
        untile(&tiled, &mut back, &s).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn round_trip_full_width_rows() {
        // W equal to the tile row, H equal to tile rows: no padding at all.
        let s = shape(1, 2, 64, 128, 0x4000, 0x100);
        let data = logical_of(&s);

        let mut tiled = vec![0u8; s.tiled_bytes() as usize];
        tile(&data, &mut tiled, &s).unwrap();
        let mut back = vec![0u8; data.len()];
        untile(&tiled, &mut back, &s).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn tile_leaves_padding_untouched() {
        let s = shape(1, 1, 2, 4, 0x4000, 0x100);
        let data = logical_of(&s);

        let mut tiled = vec![0x5au8; s.tiled_bytes() as usize];
        tile(&data, &mut tiled, &s).unwrap();

        // Row 0 bytes 0..8 written; rest of the 256-byte row untouched.
        assert_eq!(&tiled[0..8], &data[0..8]);
        assert!(tiled[8..0x100].iter().all(|&b| b == 0x5a));
        // Rows beyond H untouched.
        assert!(tiled[0x200..].iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn untile_zero_fills_destination() {
        let s = shape(1, 1, 2, 4, 0x4000, 0x100);
        let tiled = vec![0u8; s.tiled_bytes() as usize];

        let mut out = vec![0xffu8; s.logical_bytes() as usize];
        untile(&tiled, &mut out, &s).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn length_mismatch_copies_nothing() {
        let s = shape(1, 1, 2, 4, 0x4000, 0x100);
        let data = logical_of(&s);

        let mut short = vec![0x77u8; 16];
        assert!(tile(&data, &mut short, &s).is_err());
        assert!(short.iter().all(|&b| b == 0x77));

        let mut out = vec![0x77u8; 4];
        let tiled = vec![0u8; s.tiled_bytes() as usize];
        assert!(untile(&tiled, &mut out, &s).is_err());
        assert!(out.iter().all(|&b| b == 0x77));
    }

    #[test]
    fn degenerate_shape_is_rejected() {
        let s = shape(1, 1, 0, 4, 0x4000, 0x100);
        let mut dst = vec![0u8; 4];
        assert!(matches!(
            tile(&[], &mut dst, &s),
            Err(AneError::InvalidArgument { .. })
        ));
    }
}
