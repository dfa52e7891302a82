//! JPEG stream probing
//!
//! A marker scan that collects everything the passthrough path needs
//! without decoding any pixels: frame dimensions and component count from
//! the first SOF segment, the reassembled APP2 ICC profile, the Adobe
//! APP14 signal used for inverted-CMYK detection, and the EXIF orientation
//! from APP1. The scan stops at SOS, where entropy-coded data begins.

use crate::error::{RasterError, Result};
use crate::loader::tiff::ByteOrder;
use crate::raster::Orientation;

const ICC_SEGMENT_PREFIX: &[u8] = b"ICC_PROFILE\0";
const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const ORIENTATION_TAG: u16 = 0x0112;

#[derive(Debug)]
pub(crate) struct JpegInfo {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    pub bits_per_component: u8,
    pub icc: Option<Vec<u8>>,
    pub adobe_app14: bool,
    pub orientation: Orientation,
}

fn is_sof(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && marker != 0xC4 && marker != 0xC8 && marker != 0xCC
}

/// Scan the marker stream of a JPEG for frame and metadata segments.
pub(crate) fn parse_jpeg(data: &[u8]) -> Result<JpegInfo> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(RasterError::CorruptData("not a JPEG stream".to_string()));
    }

    let mut pos = 2;
    let mut frame: Option<(u32, u32, u8, u8)> = None;
    let mut icc_chunks: Vec<(u8, Vec<u8>)> = Vec::new();
    let mut adobe_app14 = false;
    let mut orientation = Orientation::Upright;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return Err(RasterError::CorruptData(
                "invalid JPEG marker sequence".to_string(),
            ));
        }
        let marker = data[pos + 1];
        pos += 2;

        match marker {
            // Fill byte, only the first 0xFF was padding
            0xFF => {
                pos -= 1;
                continue;
            }
            // Standalone markers without a length field
            0xD8 | 0x01 => continue,
            0xD0..=0xD7 => continue,
            // End of image
            0xD9 => break,
            _ => {}
        }

        if pos + 2 > data.len() {
            return Err(RasterError::CorruptData("truncated JPEG stream".to_string()));
        }
        let length = ((data[pos] as usize) << 8) | data[pos + 1] as usize;
        if length < 2 || pos + length > data.len() {
            return Err(RasterError::CorruptData(
                "JPEG segment length out of range".to_string(),
            ));
        }
        let payload = &data[pos + 2..pos + length];

        if is_sof(marker) {
            if payload.len() < 6 {
                return Err(RasterError::CorruptData(
                    "JPEG frame header too short".to_string(),
                ));
            }
            if frame.is_none() {
                let bits = payload[0];
                let height = ((payload[1] as u32) << 8) | payload[2] as u32;
                let width = ((payload[3] as u32) << 8) | payload[4] as u32;
                let components = payload[5];
                frame = Some((width, height, components, bits));
            }
        } else if marker == 0xE1 {
            if orientation.is_upright() {
                if let Some(found) = exif_orientation(payload) {
                    orientation = found;
                }
            }
        } else if marker == 0xE2 {
            if let Some(rest) = payload.strip_prefix(ICC_SEGMENT_PREFIX) {
                if rest.len() >= 2 {
                    icc_chunks.push((rest[0], rest[2..].to_vec()));
                }
            }
        } else if marker == 0xEE {
            if payload.starts_with(b"Adobe") {
                adobe_app14 = true;
            }
        } else if marker == 0xDA {
            // Start of scan: entropy-coded data follows
            break;
        }

        pos += length;
    }

    let (width, height, components, bits_per_component) = frame.ok_or_else(|| {
        RasterError::CorruptData("JPEG stream has no frame header".to_string())
    })?;
    if width == 0 || height == 0 {
        return Err(RasterError::CorruptData(
            "JPEG frame has zero dimensions".to_string(),
        ));
    }
    if !matches!(components, 1 | 3 | 4) {
        return Err(RasterError::UnsupportedFormat(format!(
            "JPEG with {components} components"
        )));
    }

    Ok(JpegInfo {
        width,
        height,
        components,
        bits_per_component,
        icc: assemble_icc(icc_chunks),
        adobe_app14,
        orientation,
    })
}

/// Concatenate APP2 profile chunks in sequence order. Validity of the
/// resulting profile is judged at registration time, not here.
fn assemble_icc(mut chunks: Vec<(u8, Vec<u8>)>) -> Option<Vec<u8>> {
    if chunks.is_empty() {
        return None;
    }
    chunks.sort_by_key(|(seq, _)| *seq);
    Some(chunks.into_iter().flat_map(|(_, data)| data).collect())
}

/// Pull the orientation tag out of the EXIF TIFF block in an APP1 segment.
fn exif_orientation(payload: &[u8]) -> Option<Orientation> {
    let tiff = payload.strip_prefix(EXIF_PREFIX)?;
    let order = match tiff.get(..2)? {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    if order.u16(tiff, 2).ok()? != 42 {
        return None;
    }
    let ifd = order.u32(tiff, 4).ok()? as usize;
    let count = order.u16(tiff, ifd).ok()? as usize;
    for i in 0..count {
        let entry = ifd + 2 + i * 12;
        if order.u16(tiff, entry).ok()? == ORIENTATION_TAG {
            let value = order.u16(tiff, entry + 8).ok()?;
            return Orientation::from_exif(value);
        }
    }
    None
}
