//! Color and bit-level transcoding
//!
//! Converts a [`RasterImage`] into the layout a PDF filter consumes: packed
//! MSB-first bilevel rows, fill-order normalization through a byte-reversal
//! table, palette expansion, alpha-plane splitting for soft masks, and EXIF
//! orientation transforms for pre-decoded rasters.

use crate::error::{RasterError, Result};
use crate::raster::{ColorMode, FillOrder, Orientation, RasterImage};

const fn build_bit_reverse_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).reverse_bits();
        i += 1;
    }
    table
}

/// Byte-indexed bit reversal, `table[0b1000_0000] == 0b0000_0001`.
///
/// TIFF FillOrder 2 stores the leftmost pixel in the low bit of each byte;
/// CCITT payloads embedded in PDF must be MSB-first, so every byte of an
/// LSB-first strip is passed through this table once.
pub const BIT_REVERSE_TABLE: [u8; 256] = build_bit_reverse_table();

/// Reverse the bit order of every byte in `data`.
pub fn reverse_bit_order(data: &[u8]) -> Vec<u8> {
    data.iter().map(|&b| BIT_REVERSE_TABLE[b as usize]).collect()
}

/// Rewrite an LSB-first bilevel raster as MSB-first. Everything else passes
/// through untouched.
pub fn normalize_fill_order(mut raster: RasterImage) -> RasterImage {
    if *raster.mode() == ColorMode::Gray1 && raster.fill_order() == FillOrder::LsbFirst {
        let reversed = reverse_bit_order(raster.data());
        let (w, h) = (raster.width(), raster.height());
        raster.replace_buffer(w, h, reversed);
        raster.set_fill_order(FillOrder::MsbFirst);
    }
    raster
}

/// Pack one row of pixels into MSB-first bytes, `true` setting the bit.
pub fn pack_row_msb(pixels: &[bool]) -> Vec<u8> {
    let mut row = vec![0u8; pixels.len().div_ceil(8)];
    for (col, &on) in pixels.iter().enumerate() {
        if on {
            row[col / 8] |= 1 << (7 - (col % 8));
        }
    }
    row
}

/// Expand a packed bilevel raster to 8-bit grayscale (0 or 255 per pixel).
pub fn unpack_bilevel(raster: &RasterImage) -> Result<Vec<u8>> {
    if *raster.mode() != ColorMode::Gray1 {
        return Err(RasterError::CorruptData(
            "cannot unpack a raster that is not bilevel".to_string(),
        ));
    }
    let width = raster.width() as usize;
    let row_bytes = RasterImage::packed_row_bytes(raster.width());
    let normalized;
    let data = if raster.fill_order() == FillOrder::LsbFirst {
        normalized = reverse_bit_order(raster.data());
        &normalized
    } else {
        raster.data()
    };

    let mut out = Vec::with_capacity(width * raster.height() as usize);
    for row in data.chunks_exact(row_bytes) {
        for col in 0..width {
            let bit = (row[col / 8] >> (7 - (col % 8))) & 1;
            out.push(if bit == 1 { 255 } else { 0 });
        }
    }
    Ok(out)
}

/// Expand palette indices to an RGB raster. Out-of-range indices map to the
/// last palette entry, matching what lenient viewers render.
pub fn expand_indexed(raster: &RasterImage) -> Result<RasterImage> {
    let palette = match raster.mode() {
        ColorMode::Indexed { palette } => palette,
        _ => {
            return Err(RasterError::CorruptData(
                "cannot expand a raster that is not indexed".to_string(),
            ))
        }
    };
    let entries = palette.len() / 3;
    let mut rgb = Vec::with_capacity(raster.data().len() * 3);
    for &index in raster.data() {
        let i = (index as usize).min(entries - 1) * 3;
        rgb.extend_from_slice(&palette[i..i + 3]);
    }
    RasterImage::rgb8(raster.width(), raster.height(), rgb)
}

fn take_color_plane(raster: &RasterImage) -> Result<RasterImage> {
    match raster.mode() {
        ColorMode::Rgba8 => {
            let mut rgb = Vec::with_capacity(raster.data().len() / 4 * 3);
            for px in raster.data().chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
            }
            RasterImage::rgb8(raster.width(), raster.height(), rgb)
        }
        ColorMode::Gray8 => RasterImage::gray8(raster.width(), raster.height(), raster.data().to_vec()),
        ColorMode::Rgb8 => RasterImage::rgb8(raster.width(), raster.height(), raster.data().to_vec()),
        ColorMode::Cmyk8 => RasterImage::cmyk8(raster.width(), raster.height(), raster.data().to_vec()),
        ColorMode::Gray1 | ColorMode::Indexed { .. } => Err(RasterError::CorruptData(
            "packed and indexed rasters carry no alpha to split".to_string(),
        )),
    }
}

/// Split a raster with transparency into its opaque color raster and an
/// 8-bit grayscale soft-mask raster. Rasters without transparency come back
/// unchanged with no mask.
pub fn split_alpha(raster: RasterImage) -> Result<(RasterImage, Option<RasterImage>)> {
    if !raster.has_alpha() {
        return Ok((raster, None));
    }
    let mask_plane: Vec<u8> = if let Some(plane) = raster.alpha() {
        plane.to_vec()
    } else {
        raster.data().chunks_exact(4).map(|px| px[3]).collect()
    };
    let mask = RasterImage::gray8(raster.width(), raster.height(), mask_plane)?;
    let mut color = take_color_plane(&raster)?;
    if let Some(icc) = raster.icc_profile() {
        color = color.with_icc_profile(icc.to_vec());
    }
    Ok((color, Some(mask)))
}

/// Drop transparency without producing a mask, for documents that embed
/// images opaque.
pub fn discard_alpha(raster: RasterImage) -> Result<RasterImage> {
    if !raster.has_alpha() {
        return Ok(raster);
    }
    let mut color = take_color_plane(&raster)?;
    if let Some(icc) = raster.icc_profile() {
        color = color.with_icc_profile(icc.to_vec());
    }
    Ok(color)
}

/// Rewrite the pixel buffer upright according to the raster's declared EXIF
/// orientation. Packed and indexed rasters only support the identity
/// orientation.
pub fn apply_orientation(mut raster: RasterImage) -> Result<RasterImage> {
    let orientation = raster.orientation();
    if orientation.is_upright() {
        return Ok(raster);
    }
    let bpp = match raster.mode() {
        ColorMode::Gray8 => 1,
        ColorMode::Rgb8 => 3,
        ColorMode::Rgba8 | ColorMode::Cmyk8 => 4,
        ColorMode::Gray1 | ColorMode::Indexed { .. } => {
            return Err(RasterError::UnsupportedFormat(
                "cannot reorient a packed or indexed raster".to_string(),
            ))
        }
    };
    if raster.alpha().is_some() {
        return Err(RasterError::UnsupportedFormat(
            "cannot reorient a raster with a detached alpha plane".to_string(),
        ));
    }

    let (w, h) = (raster.width() as usize, raster.height() as usize);
    let (dst_w, dst_h) = if orientation.swaps_dimensions() {
        (h, w)
    } else {
        (w, h)
    };
    let src = raster.data();
    let mut dst = vec![0u8; src.len()];
    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let (sx, sy) = match orientation {
                Orientation::Upright => (dx, dy),
                Orientation::FlipHorizontal => (w - 1 - dx, dy),
                Orientation::Rotate180 => (w - 1 - dx, h - 1 - dy),
                Orientation::FlipVertical => (dx, h - 1 - dy),
                Orientation::Transpose => (dy, dx),
                Orientation::Rotate90 => (dy, h - 1 - dx),
                Orientation::Transverse => (w - 1 - dy, h - 1 - dx),
                Orientation::Rotate270 => (w - 1 - dy, dx),
            };
            let s = (sy * w + sx) * bpp;
            let d = (dy * dst_w + dx) * bpp;
            dst[d..d + bpp].copy_from_slice(&src[s..s + bpp]);
        }
    }
    raster.replace_buffer(dst_w as u32, dst_h as u32, dst);
    raster.set_orientation(Orientation::Upright);
    Ok(raster)
}
