//! PNG probing for palette and bilevel passthrough
//!
//! The general decoder expands palettes and sub-byte depths, which would
//! lose the Indexed color space and the bilevel packing. This probe decodes
//! with identity transformations so palette indices and 1-bit rows survive;
//! anything it does not claim is deferred to the `image` crate.

use crate::error::{RasterError, Result};
use crate::raster::{FillOrder, RasterImage};
use png::{BitDepth, ColorType, Transformations};
use std::io::Cursor;

#[derive(Debug)]
pub(crate) enum PngProbe {
    /// Palette image with 8-bit indices and the palette kept verbatim.
    Indexed(RasterImage),
    /// 1-bit grayscale with rows packed MSB-first, bit 1 white.
    Bilevel(RasterImage),
    /// Hand the stream to the general decoder.
    Defer,
}

/// Probe a PNG stream for the two representations worth preserving.
pub(crate) fn probe_png(data: &[u8]) -> Result<PngProbe> {
    let mut decoder = png::Decoder::new(Cursor::new(data));
    decoder.set_transformations(Transformations::IDENTITY);
    let mut reader = decoder
        .read_info()
        .map_err(|e| RasterError::CorruptData(format!("PNG: {e}")))?;

    let (width, height, color_type, bit_depth, has_trns, palette, icc) = {
        let info = reader.info();
        (
            info.width,
            info.height,
            info.color_type,
            info.bit_depth,
            info.trns.is_some(),
            info.palette.as_ref().map(|p| p.to_vec()),
            info.icc_profile.as_ref().map(|p| p.to_vec()),
        )
    };

    match (color_type, bit_depth) {
        // A transparent palette entry needs the RGBA expansion path
        (ColorType::Indexed, depth) if !has_trns => {
            let palette = palette.ok_or_else(|| {
                RasterError::CorruptData("indexed PNG without a palette".to_string())
            })?;
            let packed = read_frame(&mut reader)?;
            let indices = expand_indices(&packed, width, height, depth)?;
            let raster = with_icc(RasterImage::indexed(width, height, palette, indices)?, icc);
            Ok(PngProbe::Indexed(raster))
        }
        (ColorType::Grayscale, BitDepth::One) if !has_trns => {
            let packed = read_frame(&mut reader)?;
            let raster = with_icc(
                RasterImage::gray1_packed(width, height, packed, FillOrder::MsbFirst)?,
                icc,
            );
            Ok(PngProbe::Bilevel(raster))
        }
        _ => Ok(PngProbe::Defer),
    }
}

fn with_icc(raster: RasterImage, icc: Option<Vec<u8>>) -> RasterImage {
    match icc {
        Some(icc) => raster.with_icc_profile(icc),
        None => raster,
    }
}

fn read_frame<R: std::io::Read>(reader: &mut png::Reader<R>) -> Result<Vec<u8>> {
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buf)
        .map_err(|e| RasterError::CorruptData(format!("PNG: {e}")))?;
    buf.truncate(frame.buffer_size());
    Ok(buf)
}

/// Widen packed sub-byte palette indices to one byte each. PNG packs pixels
/// left to right from the high bits of each byte; rows are byte-aligned.
fn expand_indices(packed: &[u8], width: u32, height: u32, depth: BitDepth) -> Result<Vec<u8>> {
    let bits = match depth {
        BitDepth::One => 1usize,
        BitDepth::Two => 2,
        BitDepth::Four => 4,
        BitDepth::Eight => {
            return Ok(packed.to_vec());
        }
        BitDepth::Sixteen => {
            return Err(RasterError::CorruptData(
                "indexed PNG with 16-bit depth".to_string(),
            ));
        }
    };
    let row_bytes = (width as usize * bits).div_ceil(8);
    if packed.len() < row_bytes * height as usize {
        return Err(RasterError::CorruptData(
            "PNG pixel data shorter than its geometry".to_string(),
        ));
    }
    let mask = (1u8 << bits) - 1;
    let per_byte = 8 / bits;
    let mut out = Vec::with_capacity(width as usize * height as usize);
    for row in packed.chunks_exact(row_bytes).take(height as usize) {
        for col in 0..width as usize {
            let byte = row[col / per_byte];
            let shift = 8 - bits * (col % per_byte + 1);
            out.push((byte >> shift) & mask);
        }
    }
    Ok(out)
}
