//! JPEG 2000 header probing
//!
//! JPXDecode payloads are embedded byte-identical, so only the geometry is
//! read: the `ihdr` box of a JP2 container, or the SIZ segment of a raw
//! codestream. No JPEG 2000 entropy decoding happens anywhere in the crate.

use crate::error::{RasterError, Result};

pub(crate) const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];
pub(crate) const J2K_SIGNATURE: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

#[derive(Debug, Clone, Copy)]
pub(crate) struct JpxInfo {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    pub bits_per_component: u8,
}

fn be_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| RasterError::CorruptData("truncated JPEG 2000 stream".to_string()))
}

fn be_u16(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .and_then(|s| s.try_into().ok())
        .map(u16::from_be_bytes)
        .ok_or_else(|| RasterError::CorruptData("truncated JPEG 2000 stream".to_string()))
}

/// Walk a box sequence for the first box of the wanted type, returning its
/// content. Handles the extended-length and to-end-of-file encodings.
fn find_box<'a>(mut data: &'a [u8], want: &[u8; 4]) -> Option<&'a [u8]> {
    while data.len() >= 8 {
        let declared = u32::from_be_bytes(data[..4].try_into().ok()?) as usize;
        let box_type = &data[4..8];
        let (content, rest): (&[u8], &[u8]) = match declared {
            0 => (&data[8..], &[]),
            1 => {
                let extended =
                    u64::from_be_bytes(data.get(8..16)?.try_into().ok()?) as usize;
                if extended < 16 || extended > data.len() {
                    return None;
                }
                (&data[16..extended], &data[extended..])
            }
            length if length >= 8 && length <= data.len() => {
                (&data[8..length], &data[length..])
            }
            _ => return None,
        };
        if box_type == want {
            return Some(content);
        }
        data = rest;
    }
    None
}

fn check_geometry(width: u32, height: u32, components: u16, bits: u8) -> Result<JpxInfo> {
    if width == 0 || height == 0 {
        return Err(RasterError::CorruptData(
            "JPEG 2000 image has zero dimensions".to_string(),
        ));
    }
    if !matches!(components, 1 | 3 | 4) {
        return Err(RasterError::UnsupportedFormat(format!(
            "JPEG 2000 image with {components} components"
        )));
    }
    Ok(JpxInfo {
        width,
        height,
        components: components as u8,
        bits_per_component: bits,
    })
}

fn parse_codestream(data: &[u8]) -> Result<JpxInfo> {
    // SOC at 0, SIZ marker at 2; reference grid minus image offset
    let x_size = be_u32(data, 8)?;
    let y_size = be_u32(data, 12)?;
    let x_offset = be_u32(data, 16)?;
    let y_offset = be_u32(data, 20)?;
    if x_offset > x_size || y_offset > y_size {
        return Err(RasterError::CorruptData(
            "JPEG 2000 image offset exceeds its grid".to_string(),
        ));
    }
    let components = be_u16(data, 40)?;
    let bits = match data.get(42) {
        Some(&ssiz) => (ssiz & 0x7F) + 1,
        None => 8,
    };
    check_geometry(x_size - x_offset, y_size - y_offset, components, bits)
}

fn parse_container(data: &[u8]) -> Result<JpxInfo> {
    let header = find_box(data, b"jp2h").ok_or_else(|| {
        RasterError::CorruptData("JPEG 2000 container without a header box".to_string())
    })?;
    let ihdr = find_box(header, b"ihdr").ok_or_else(|| {
        RasterError::CorruptData("JPEG 2000 header without an ihdr box".to_string())
    })?;
    if ihdr.len() < 14 {
        return Err(RasterError::CorruptData(
            "JPEG 2000 ihdr box too short".to_string(),
        ));
    }
    let height = be_u32(ihdr, 0)?;
    let width = be_u32(ihdr, 4)?;
    let components = be_u16(ihdr, 8)?;
    // 255 means the depth varies per component; assume the common 8
    let bits = match ihdr[10] {
        255 => 8,
        raw => (raw & 0x7F) + 1,
    };
    check_geometry(width, height, components, bits)
}

/// Read the geometry of a JP2 container or raw J2K codestream.
pub(crate) fn parse_jpx(data: &[u8]) -> Result<JpxInfo> {
    if data.starts_with(&J2K_SIGNATURE) {
        parse_codestream(data)
    } else if data.starts_with(&JP2_SIGNATURE) {
        parse_container(data)
    } else {
        Err(RasterError::UnsupportedFormat(
            "not a JPEG 2000 stream".to_string(),
        ))
    }
}
