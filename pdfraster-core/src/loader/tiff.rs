//! TIFF container probing
//!
//! Reads the image file directory directly for the two cases the general
//! decoder cannot serve: raw Group 4 strip passthrough (the `tiff` backend
//! has no CCITT support) and Separated strip decode (the general decoder
//! would normalize CMYK samples to RGB). Everything else is deferred to the
//! `image` crate by the loader.

use crate::error::{RasterError, Result};
use crate::raster::{FillOrder, RasterImage};
use crate::transcode::reverse_bit_order;
use std::collections::HashMap;

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_FILL_ORDER: u16 = 266;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIG: u16 = 284;
const TAG_PREDICTOR: u16 = 317;
const TAG_ICC_PROFILE: u16 = 34675;

const COMPRESSION_NONE: u32 = 1;
const COMPRESSION_G3: u32 = 3;
const COMPRESSION_G4: u32 = 4;
const COMPRESSION_LZW: u32 = 5;
const COMPRESSION_DEFLATE: u32 = 8;
const COMPRESSION_DEFLATE_OLD: u32 = 32946;
const COMPRESSION_PACKBITS: u32 = 32773;

const PHOTOMETRIC_MIN_IS_WHITE: u32 = 0;
const PHOTOMETRIC_MIN_IS_BLACK: u32 = 1;
const PHOTOMETRIC_SEPARATED: u32 = 5;

/// Outcome of probing a TIFF byte stream.
#[derive(Debug)]
pub(crate) enum TiffProbe {
    /// Raw Group 4 strip, ready for CCITTFaxDecode passthrough. The strip
    /// bytes are already normalized to MSB-first fill order.
    Group4(G4Strip),
    /// Decoded Separated raster, kept as DeviceCMYK.
    Cmyk(RasterImage),
    /// Hand the stream to the general decoder.
    Defer,
}

#[derive(Debug)]
pub(crate) struct G4Strip {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub black_is_1: bool,
}

impl G4Strip {
    /// Expand the strip to a packed bilevel raster for the paths that
    /// cannot embed the fax stream as-is.
    pub(crate) fn decode(&self) -> Result<RasterImage> {
        let packed =
            crate::filters::ccitt::g4_decode(&self.data, self.width, self.height, self.black_is_1)?;
        RasterImage::gray1_packed(self.width, self.height, packed, FillOrder::MsbFirst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub(crate) fn u16(&self, data: &[u8], offset: usize) -> Result<u16> {
        let bytes: [u8; 2] = data
            .get(offset..offset + 2)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| RasterError::CorruptData("TIFF read past end of data".to_string()))?;
        Ok(match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    pub(crate) fn u32(&self, data: &[u8], offset: usize) -> Result<u32> {
        let bytes: [u8; 4] = data
            .get(offset..offset + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| RasterError::CorruptData("TIFF read past end of data".to_string()))?;
        Ok(match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }
}

#[derive(Debug)]
struct IfdEntry {
    kind: u16,
    count: u32,
    /// Offset of the value data within the file (resolved for both inline
    /// and pointed storage).
    data_offset: usize,
}

struct TiffReader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

fn type_size(kind: u16) -> Option<usize> {
    match kind {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

impl<'a> TiffReader<'a> {
    fn new(data: &'a [u8]) -> Result<(Self, usize)> {
        let order = match data.get(..2) {
            Some(b"II") => ByteOrder::Little,
            Some(b"MM") => ByteOrder::Big,
            _ => return Err(RasterError::CorruptData("not a TIFF header".to_string())),
        };
        let reader = TiffReader { data, order };
        if reader.order.u16(data, 2)? != 42 {
            return Err(RasterError::CorruptData("not a TIFF header".to_string()));
        }
        let ifd_offset = reader.order.u32(data, 4)? as usize;
        Ok((reader, ifd_offset))
    }

    fn parse_ifd(&self, offset: usize) -> Result<HashMap<u16, IfdEntry>> {
        let count = self.order.u16(self.data, offset)? as usize;
        let mut entries = HashMap::with_capacity(count);
        for i in 0..count {
            let entry_offset = offset + 2 + i * 12;
            let tag = self.order.u16(self.data, entry_offset)?;
            let kind = self.order.u16(self.data, entry_offset + 2)?;
            let value_count = self.order.u32(self.data, entry_offset + 4)?;
            let size = match type_size(kind) {
                Some(size) => size,
                None => continue,
            };
            let total = (size as u64).saturating_mul(value_count as u64);
            if total > self.data.len() as u64 {
                return Err(RasterError::CorruptData(format!(
                    "TIFF tag {tag} declares {total} value bytes"
                )));
            }
            let data_offset = if total <= 4 {
                entry_offset + 8
            } else {
                self.order.u32(self.data, entry_offset + 8)? as usize
            };
            if data_offset + total as usize > self.data.len() {
                return Err(RasterError::CorruptData(format!(
                    "TIFF tag {tag} value lies past end of data"
                )));
            }
            entries.insert(
                tag,
                IfdEntry {
                    kind,
                    count: value_count,
                    data_offset,
                },
            );
        }
        Ok(entries)
    }

    /// Numeric values of a BYTE/SHORT/LONG entry.
    fn values(&self, entry: &IfdEntry) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(entry.count as usize);
        for i in 0..entry.count as usize {
            let value = match entry.kind {
                1 => *self
                    .data
                    .get(entry.data_offset + i)
                    .ok_or_else(|| RasterError::CorruptData("TIFF value truncated".to_string()))?
                    as u32,
                3 => self.order.u16(self.data, entry.data_offset + i * 2)? as u32,
                4 => self.order.u32(self.data, entry.data_offset + i * 4)?,
                kind => {
                    return Err(RasterError::CorruptData(format!(
                        "TIFF numeric tag stored as type {kind}"
                    )))
                }
            };
            out.push(value);
        }
        Ok(out)
    }

    fn raw_bytes(&self, entry: &IfdEntry) -> Result<Vec<u8>> {
        let size = type_size(entry.kind).unwrap_or(1);
        let total = size * entry.count as usize;
        self.data
            .get(entry.data_offset..entry.data_offset + total)
            .map(|s| s.to_vec())
            .ok_or_else(|| RasterError::CorruptData("TIFF value truncated".to_string()))
    }
}

struct IfdView<'a> {
    reader: TiffReader<'a>,
    entries: HashMap<u16, IfdEntry>,
}

impl IfdView<'_> {
    fn scalar(&self, tag: u16) -> Result<Option<u32>> {
        match self.entries.get(&tag) {
            Some(entry) => Ok(self.reader.values(entry)?.first().copied()),
            None => Ok(None),
        }
    }

    fn scalar_or(&self, tag: u16, default: u32) -> Result<u32> {
        Ok(self.scalar(tag)?.unwrap_or(default))
    }

    fn list(&self, tag: u16) -> Result<Vec<u32>> {
        match self.entries.get(&tag) {
            Some(entry) => self.reader.values(entry),
            None => Ok(Vec::new()),
        }
    }

    fn required(&self, tag: u16, what: &str) -> Result<u32> {
        self.scalar(tag)?
            .ok_or_else(|| RasterError::CorruptData(format!("TIFF is missing its {what} tag")))
    }

    fn icc_profile(&self) -> Result<Option<Vec<u8>>> {
        match self.entries.get(&TAG_ICC_PROFILE) {
            Some(entry) => Ok(Some(self.reader.raw_bytes(entry)?)),
            None => Ok(None),
        }
    }

    fn slice(&self, offset: u32, count: u32) -> Result<&[u8]> {
        self.reader
            .data
            .get(offset as usize..offset as usize + count as usize)
            .ok_or_else(|| RasterError::CorruptData("TIFF strip lies past end of data".to_string()))
    }
}

/// Probe a TIFF stream for the passthrough and CMYK special cases.
pub(crate) fn probe_tiff(data: &[u8]) -> Result<TiffProbe> {
    let (reader, ifd_offset) = TiffReader::new(data)?;
    let entries = reader.parse_ifd(ifd_offset)?;
    let ifd = IfdView { reader, entries };

    let compression = ifd.scalar_or(TAG_COMPRESSION, COMPRESSION_NONE)?;
    let photometric = ifd.scalar_or(TAG_PHOTOMETRIC, PHOTOMETRIC_MIN_IS_WHITE)?;

    match compression {
        COMPRESSION_G4 => probe_group4(&ifd, photometric).map(TiffProbe::Group4),
        COMPRESSION_G3 => Err(RasterError::UnsupportedFormat(
            "Group 3 fax TIFF".to_string(),
        )),
        _ if photometric == PHOTOMETRIC_SEPARATED => probe_cmyk(&ifd, compression),
        _ => Ok(TiffProbe::Defer),
    }
}

fn probe_group4(ifd: &IfdView, photometric: u32) -> Result<G4Strip> {
    let width = ifd.required(TAG_IMAGE_WIDTH, "width")?;
    let height = ifd.required(TAG_IMAGE_LENGTH, "height")?;
    if ifd.scalar_or(TAG_BITS_PER_SAMPLE, 1)? != 1 {
        return Err(RasterError::CorruptData(
            "Group 4 TIFF with more than one bit per sample".to_string(),
        ));
    }
    let black_is_1 = match photometric {
        PHOTOMETRIC_MIN_IS_WHITE => false,
        PHOTOMETRIC_MIN_IS_BLACK => true,
        other => {
            return Err(RasterError::UnsupportedFormat(format!(
                "Group 4 TIFF with photometric interpretation {other}"
            )))
        }
    };

    let offsets = ifd.list(TAG_STRIP_OFFSETS)?;
    let counts = ifd.list(TAG_STRIP_BYTE_COUNTS)?;
    if offsets.len() != 1 || counts.len() != 1 {
        return Err(RasterError::UnsupportedFormat(format!(
            "multi-strip Group 4 TIFF ({} strips)",
            offsets.len()
        )));
    }
    let strip = ifd.slice(offsets[0], counts[0])?;

    // FillOrder 2 stores the coded bits reversed within each byte
    let data = match ifd.scalar_or(TAG_FILL_ORDER, 1)? {
        1 => strip.to_vec(),
        2 => reverse_bit_order(strip),
        other => {
            return Err(RasterError::CorruptData(format!(
                "TIFF fill order {other}"
            )))
        }
    };

    Ok(G4Strip {
        data,
        width,
        height,
        black_is_1,
    })
}

fn probe_cmyk(ifd: &IfdView, compression: u32) -> Result<TiffProbe> {
    let supported_compression = matches!(
        compression,
        COMPRESSION_NONE
            | COMPRESSION_LZW
            | COMPRESSION_DEFLATE
            | COMPRESSION_DEFLATE_OLD
            | COMPRESSION_PACKBITS
    );
    let chunky = ifd.scalar_or(TAG_PLANAR_CONFIG, 1)? == 1;
    let samples = ifd.scalar_or(TAG_SAMPLES_PER_PIXEL, 4)?;
    let eight_bit = ifd
        .list(TAG_BITS_PER_SAMPLE)?
        .iter()
        .all(|&bits| bits == 8);
    if !supported_compression || !chunky || samples != 4 || !eight_bit {
        return Ok(TiffProbe::Defer);
    }

    let width = ifd.required(TAG_IMAGE_WIDTH, "width")?;
    let height = ifd.required(TAG_IMAGE_LENGTH, "height")?;
    let rows_per_strip = ifd.scalar_or(TAG_ROWS_PER_STRIP, height.max(1))?.max(1);
    let predictor = ifd.scalar_or(TAG_PREDICTOR, 1)?;

    let offsets = ifd.list(TAG_STRIP_OFFSETS)?;
    let counts = ifd.list(TAG_STRIP_BYTE_COUNTS)?;
    if offsets.is_empty() || offsets.len() != counts.len() {
        return Err(RasterError::CorruptData(
            "TIFF strip tables disagree".to_string(),
        ));
    }

    let row_bytes = (width as usize)
        .checked_mul(4)
        .and_then(|row| row.checked_mul(height as usize).map(|_| row))
        .ok_or_else(|| {
            RasterError::CorruptData(format!(
                "TIFF dimensions {width}x{height} overflow the pixel buffer"
            ))
        })?;
    let mut pixels = Vec::new();
    for (index, (&offset, &count)) in offsets.iter().zip(counts.iter()).enumerate() {
        let strip = ifd.slice(offset, count)?;
        let consumed = (index as u64)
            .saturating_mul(u64::from(rows_per_strip))
            .min(u64::from(height)) as u32;
        let rows_here = rows_per_strip.min(height - consumed);
        // rows_here <= height, so this product stays below the checked total
        let expected = row_bytes * rows_here as usize;
        let mut decoded = decode_strip(strip, compression)?;
        if decoded.len() < expected {
            return Err(RasterError::CorruptData(format!(
                "TIFF strip {index} decoded to {} bytes, expected {expected}",
                decoded.len()
            )));
        }
        decoded.truncate(expected);
        if predictor == 2 {
            undo_horizontal_predictor(&mut decoded, row_bytes, 4);
        }
        pixels.extend_from_slice(&decoded);
    }

    let mut raster = RasterImage::cmyk8(width, height, pixels)?;
    if let Some(icc) = ifd.icc_profile()? {
        raster = raster.with_icc_profile(icc);
    }
    Ok(TiffProbe::Cmyk(raster))
}

fn decode_strip(strip: &[u8], compression: u32) -> Result<Vec<u8>> {
    match compression {
        COMPRESSION_NONE => Ok(strip.to_vec()),
        // TIFF LZW is the same MSB-first, early-change variant PDF uses
        COMPRESSION_LZW => crate::filters::lzw::lzw_decode(strip),
        COMPRESSION_DEFLATE | COMPRESSION_DEFLATE_OLD => crate::filters::flate_decompress(strip),
        COMPRESSION_PACKBITS => unpack_bits(strip),
        _ => Err(RasterError::UnsupportedFormat(format!(
            "TIFF compression {compression}"
        ))),
    }
}

fn unpack_bits(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 2);
    let mut pos = 0;
    while pos < input.len() {
        let control = input[pos] as i8;
        pos += 1;
        if control >= 0 {
            let run = control as usize + 1;
            let literal = input.get(pos..pos + run).ok_or_else(|| {
                RasterError::CorruptData("PackBits literal run truncated".to_string())
            })?;
            out.extend_from_slice(literal);
            pos += run;
        } else if control != -128 {
            let run = 1 - control as isize;
            let byte = *input.get(pos).ok_or_else(|| {
                RasterError::CorruptData("PackBits repeat run truncated".to_string())
            })?;
            pos += 1;
            out.extend(std::iter::repeat(byte).take(run as usize));
        }
    }
    Ok(out)
}

fn undo_horizontal_predictor(data: &mut [u8], row_bytes: usize, components: usize) {
    for row in data.chunks_exact_mut(row_bytes) {
        for i in components..row.len() {
            row[i] = row[i].wrapping_add(row[i - components]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::ccitt::g4_encode;
    use crate::filters::flate_compress;
    use crate::filters::lzw::lzw_encode;
    use crate::raster::ColorMode;

    /// Minimal little-endian TIFF builder for the probe tests.
    struct TiffBuilder {
        entries: Vec<(u16, u16, u32, Vec<u8>)>,
    }

    impl TiffBuilder {
        fn new() -> Self {
            TiffBuilder {
                entries: Vec::new(),
            }
        }

        fn short(mut self, tag: u16, value: u16) -> Self {
            self.entries.push((tag, 3, 1, value.to_le_bytes().to_vec()));
            self
        }

        fn long(mut self, tag: u16, value: u32) -> Self {
            self.entries.push((tag, 4, 1, value.to_le_bytes().to_vec()));
            self
        }

        fn longs(mut self, tag: u16, values: &[u32]) -> Self {
            let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            self.entries.push((tag, 4, values.len() as u32, bytes));
            self
        }

        fn shorts(mut self, tag: u16, values: &[u16]) -> Self {
            let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            self.entries.push((tag, 3, values.len() as u32, bytes));
            self
        }

        fn undefined(mut self, tag: u16, bytes: &[u8]) -> Self {
            self.entries
                .push((tag, 7, bytes.len() as u32, bytes.to_vec()));
            self
        }

        /// Serialize the IFD followed by the payload blocks. `blocks` are
        /// appended in order and a `long` entry whose value is
        /// `BLOCK_BASE + i` is rewritten to the absolute offset of block i.
        fn build(mut self, blocks: &[&[u8]]) -> Vec<u8> {
            const BLOCK_BASE: u32 = 0x4000_0000;
            self.entries.sort_by_key(|e| e.0);

            let ifd_offset = 8usize;
            let entry_area = 2 + self.entries.len() * 12 + 4;
            let mut overflow_offset = ifd_offset + entry_area;
            let mut overflow: Vec<u8> = Vec::new();

            // First pass sizes the overflow area for values wider than 4 bytes
            let mut placed: Vec<Option<u32>> = Vec::new();
            for (_, _, _, value) in &self.entries {
                if value.len() > 4 {
                    placed.push(Some(overflow_offset as u32));
                    overflow_offset += value.len();
                } else {
                    placed.push(None);
                }
            }
            let mut block_offsets = Vec::new();
            for block in blocks {
                block_offsets.push(overflow_offset as u32);
                overflow_offset += block.len();
            }

            let mut out = Vec::new();
            out.extend_from_slice(b"II");
            out.extend_from_slice(&42u16.to_le_bytes());
            out.extend_from_slice(&(ifd_offset as u32).to_le_bytes());
            out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
            for (i, (tag, kind, count, value)) in self.entries.iter().enumerate() {
                out.extend_from_slice(&tag.to_le_bytes());
                out.extend_from_slice(&kind.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
                let mut value = value.clone();
                if *kind == 4 {
                    for chunk in value.chunks_exact_mut(4) {
                        let v = u32::from_le_bytes(chunk.try_into().unwrap());
                        if v >= BLOCK_BASE && ((v - BLOCK_BASE) as usize) < block_offsets.len() {
                            chunk.copy_from_slice(
                                &block_offsets[(v - BLOCK_BASE) as usize].to_le_bytes(),
                            );
                        }
                    }
                }
                if value.len() <= 4 {
                    value.resize(4, 0);
                    out.extend_from_slice(&value);
                } else {
                    out.extend_from_slice(&placed[i].unwrap().to_le_bytes());
                    overflow.extend_from_slice(&value);
                }
            }
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&overflow);
            for block in blocks {
                out.extend_from_slice(block);
            }
            out
        }
    }

    const BLOCK0: u32 = 0x4000_0000;

    fn bilevel_strip() -> (Vec<u8>, u32, u32) {
        let width = 16u32;
        let height = 8u32;
        let row_bytes = RasterImage::packed_row_bytes(width);
        let mut data = vec![0u8; row_bytes * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                if (x / 2 + y) % 2 == 0 {
                    data[y * row_bytes + x / 8] |= 0x80 >> (x % 8);
                }
            }
        }
        let raster =
            RasterImage::gray1_packed(width, height, data, FillOrder::MsbFirst).unwrap();
        (g4_encode(&raster).unwrap(), width, height)
    }

    fn g4_tiff(fill_order: u16, photometric: u16, strip: &[u8], width: u32, height: u32) -> Vec<u8> {
        TiffBuilder::new()
            .long(TAG_IMAGE_WIDTH, width)
            .long(TAG_IMAGE_LENGTH, height)
            .short(TAG_BITS_PER_SAMPLE, 1)
            .short(TAG_COMPRESSION, COMPRESSION_G4 as u16)
            .short(TAG_PHOTOMETRIC, photometric)
            .short(TAG_FILL_ORDER, fill_order)
            .long(TAG_STRIP_OFFSETS, BLOCK0)
            .long(TAG_STRIP_BYTE_COUNTS, strip.len() as u32)
            .build(&[strip])
    }

    #[test]
    fn test_g4_single_strip_passthrough() {
        let (strip, width, height) = bilevel_strip();
        let tiff = g4_tiff(1, 0, &strip, width, height);
        match probe_tiff(&tiff).unwrap() {
            TiffProbe::Group4(g4) => {
                assert_eq!(g4.data, strip);
                assert_eq!(g4.width, width);
                assert_eq!(g4.height, height);
                assert!(!g4.black_is_1);
            }
            other => panic!("expected Group4 probe, got {other:?}"),
        }
    }

    #[test]
    fn test_g4_lsb_fill_order_normalized() {
        let (strip, width, height) = bilevel_strip();
        let reversed = reverse_bit_order(&strip);
        let tiff = g4_tiff(2, 0, &reversed, width, height);
        match probe_tiff(&tiff).unwrap() {
            TiffProbe::Group4(g4) => assert_eq!(g4.data, strip),
            other => panic!("expected Group4 probe, got {other:?}"),
        }
    }

    #[test]
    fn test_g4_min_is_black_sets_polarity() {
        let (strip, width, height) = bilevel_strip();
        let tiff = g4_tiff(1, 1, &strip, width, height);
        match probe_tiff(&tiff).unwrap() {
            TiffProbe::Group4(g4) => assert!(g4.black_is_1),
            other => panic!("expected Group4 probe, got {other:?}"),
        }
    }

    #[test]
    fn test_g4_palette_photometric_rejected() {
        let (strip, width, height) = bilevel_strip();
        let tiff = g4_tiff(1, 3, &strip, width, height);
        assert!(matches!(
            probe_tiff(&tiff),
            Err(RasterError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_g3_rejected() {
        let tiff = TiffBuilder::new()
            .long(TAG_IMAGE_WIDTH, 4)
            .long(TAG_IMAGE_LENGTH, 4)
            .short(TAG_COMPRESSION, COMPRESSION_G3 as u16)
            .build(&[]);
        assert!(matches!(
            probe_tiff(&tiff),
            Err(RasterError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_multi_strip_g4_rejected() {
        let (strip, width, height) = bilevel_strip();
        let tiff = TiffBuilder::new()
            .long(TAG_IMAGE_WIDTH, width)
            .long(TAG_IMAGE_LENGTH, height)
            .short(TAG_COMPRESSION, COMPRESSION_G4 as u16)
            .longs(TAG_STRIP_OFFSETS, &[BLOCK0, BLOCK0])
            .longs(TAG_STRIP_BYTE_COUNTS, &[strip.len() as u32, strip.len() as u32])
            .build(&[&strip]);
        assert!(matches!(
            probe_tiff(&tiff),
            Err(RasterError::UnsupportedFormat(_))
        ));
    }

    fn cmyk_pixels(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[
                    (x * 17) as u8,
                    (y * 29) as u8,
                    ((x + y) * 13) as u8,
                    (x * y) as u8,
                ]);
            }
        }
        data
    }

    fn cmyk_tiff(compression: u16, predictor: Option<u16>, strip: &[u8], width: u32, height: u32) -> Vec<u8> {
        let mut builder = TiffBuilder::new()
            .long(TAG_IMAGE_WIDTH, width)
            .long(TAG_IMAGE_LENGTH, height)
            .short(TAG_COMPRESSION, compression)
            .short(TAG_PHOTOMETRIC, PHOTOMETRIC_SEPARATED as u16)
            .short(TAG_SAMPLES_PER_PIXEL, 4)
            .shorts(TAG_BITS_PER_SAMPLE, &[8, 8, 8, 8])
            .long(TAG_STRIP_OFFSETS, BLOCK0)
            .long(TAG_STRIP_BYTE_COUNTS, strip.len() as u32);
        if let Some(predictor) = predictor {
            builder = builder.short(TAG_PREDICTOR, predictor);
        }
        builder.build(&[strip])
    }

    #[test]
    fn test_cmyk_uncompressed_strip() {
        let pixels = cmyk_pixels(5, 4);
        let tiff = cmyk_tiff(COMPRESSION_NONE as u16, None, &pixels, 5, 4);
        match probe_tiff(&tiff).unwrap() {
            TiffProbe::Cmyk(raster) => {
                assert_eq!(raster.width(), 5);
                assert_eq!(raster.height(), 4);
                assert!(matches!(raster.mode(), ColorMode::Cmyk8));
                assert_eq!(raster.data(), pixels.as_slice());
            }
            other => panic!("expected Cmyk probe, got {other:?}"),
        }
    }

    #[test]
    fn test_cmyk_lzw_with_predictor() {
        let pixels = cmyk_pixels(6, 3);
        let row_bytes = 6 * 4;
        // Apply the horizontal predictor forward, then compress
        let mut differenced = pixels.clone();
        for row in differenced.chunks_exact_mut(row_bytes) {
            for i in (4..row.len()).rev() {
                row[i] = row[i].wrapping_sub(row[i - 4]);
            }
        }
        let strip = lzw_encode(&differenced).unwrap();
        let tiff = cmyk_tiff(COMPRESSION_LZW as u16, Some(2), &strip, 6, 3);
        match probe_tiff(&tiff).unwrap() {
            TiffProbe::Cmyk(raster) => assert_eq!(raster.data(), pixels.as_slice()),
            other => panic!("expected Cmyk probe, got {other:?}"),
        }
    }

    #[test]
    fn test_cmyk_deflate_strip() {
        let pixels = cmyk_pixels(4, 4);
        let strip = flate_compress(&pixels).unwrap();
        let tiff = cmyk_tiff(COMPRESSION_DEFLATE as u16, None, &strip, 4, 4);
        match probe_tiff(&tiff).unwrap() {
            TiffProbe::Cmyk(raster) => assert_eq!(raster.data(), pixels.as_slice()),
            other => panic!("expected Cmyk probe, got {other:?}"),
        }
    }

    #[test]
    fn test_cmyk_packbits_strip() {
        let pixels = vec![0x20u8; 4 * 2 * 4];
        // One repeat run per row: control -7 repeats the byte 8 times
        let mut strip = Vec::new();
        for _ in 0..(pixels.len() / 8) {
            strip.push((-7i8) as u8);
            strip.push(0x20);
        }
        let tiff = cmyk_tiff(COMPRESSION_PACKBITS as u16, None, &strip, 4, 2);
        match probe_tiff(&tiff).unwrap() {
            TiffProbe::Cmyk(raster) => assert_eq!(raster.data(), pixels.as_slice()),
            other => panic!("expected Cmyk probe, got {other:?}"),
        }
    }

    #[test]
    fn test_cmyk_planar_defers() {
        let pixels = cmyk_pixels(4, 2);
        let tiff = TiffBuilder::new()
            .long(TAG_IMAGE_WIDTH, 4)
            .long(TAG_IMAGE_LENGTH, 2)
            .short(TAG_COMPRESSION, COMPRESSION_NONE as u16)
            .short(TAG_PHOTOMETRIC, PHOTOMETRIC_SEPARATED as u16)
            .short(TAG_SAMPLES_PER_PIXEL, 4)
            .short(TAG_PLANAR_CONFIG, 2)
            .shorts(TAG_BITS_PER_SAMPLE, &[8, 8, 8, 8])
            .long(TAG_STRIP_OFFSETS, BLOCK0)
            .long(TAG_STRIP_BYTE_COUNTS, pixels.len() as u32)
            .build(&[&pixels]);
        assert!(matches!(probe_tiff(&tiff).unwrap(), TiffProbe::Defer));
    }

    #[test]
    fn test_rgb_tiff_defers() {
        let tiff = TiffBuilder::new()
            .long(TAG_IMAGE_WIDTH, 4)
            .long(TAG_IMAGE_LENGTH, 4)
            .short(TAG_COMPRESSION, COMPRESSION_NONE as u16)
            .short(TAG_PHOTOMETRIC, 2)
            .short(TAG_SAMPLES_PER_PIXEL, 3)
            .build(&[]);
        assert!(matches!(probe_tiff(&tiff).unwrap(), TiffProbe::Defer));
    }

    #[test]
    fn test_cmyk_icc_profile_extracted() {
        let pixels = cmyk_pixels(3, 3);
        let icc = vec![0xABu8; 40];
        let tiff = TiffBuilder::new()
            .long(TAG_IMAGE_WIDTH, 3)
            .long(TAG_IMAGE_LENGTH, 3)
            .short(TAG_COMPRESSION, COMPRESSION_NONE as u16)
            .short(TAG_PHOTOMETRIC, PHOTOMETRIC_SEPARATED as u16)
            .short(TAG_SAMPLES_PER_PIXEL, 4)
            .shorts(TAG_BITS_PER_SAMPLE, &[8, 8, 8, 8])
            .undefined(TAG_ICC_PROFILE, &icc)
            .long(TAG_STRIP_OFFSETS, BLOCK0)
            .long(TAG_STRIP_BYTE_COUNTS, pixels.len() as u32)
            .build(&[&pixels]);
        match probe_tiff(&tiff).unwrap() {
            TiffProbe::Cmyk(raster) => assert_eq!(raster.icc_profile(), Some(icc.as_slice())),
            other => panic!("expected Cmyk probe, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert!(probe_tiff(b"II").is_err());
        assert!(probe_tiff(b"XX\x00\x2A").is_err());
    }

    #[test]
    fn test_overflowing_dimensions_rejected() {
        // 0x8000_0000 squared times four samples is exactly 2^64
        let tiff = cmyk_tiff(
            COMPRESSION_NONE as u16,
            None,
            &[0u8; 16],
            0x8000_0000,
            0x8000_0000,
        );
        assert!(matches!(
            probe_tiff(&tiff),
            Err(RasterError::CorruptData(_))
        ));
    }

    #[test]
    fn test_strip_past_end_rejected() {
        let (strip, width, height) = bilevel_strip();
        let mut tiff = g4_tiff(1, 0, &strip, width, height);
        let keep = tiff.len() - strip.len() / 2;
        tiff.truncate(keep);
        assert!(probe_tiff(&tiff).is_err());
    }

    #[test]
    fn test_unpack_bits_literal_and_repeat() {
        // Literal run of 3, repeat run of 4, then a noop control
        let input = [2u8, 0xAA, 0xBB, 0xCC, (-3i8) as u8, 0x11, 0x80];
        let out = unpack_bits(&input).unwrap();
        assert_eq!(out, [0xAA, 0xBB, 0xCC, 0x11, 0x11, 0x11, 0x11]);
    }

    #[test]
    fn test_unpack_bits_truncated() {
        assert!(unpack_bits(&[5u8, 0x01]).is_err());
        assert!(unpack_bits(&[(-3i8) as u8]).is_err());
    }
}
