//! CCITTFaxDecode (Group 4) encoding and decoding
//!
//! Bilevel rasters are compressed with two-dimensional T.6 coding, the
//! `K -1` variant of CCITTFaxDecode. Streams produced here always map fax
//! black runs to visually black pixels, so their parameters carry
//! `BlackIs1 false`. Group 4 payloads lifted intact from TIFF containers may
//! use either polarity; the flag travels with the stream.

use crate::error::{RasterError, Result};
use crate::objects::Dictionary;
use crate::raster::{ColorMode, FillOrder, RasterImage};
use fax::encoder::Encoder;
use fax::{Color, VecWriter};

/// `DecodeParms` of a Group 4 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcittParams {
    pub columns: u32,
    pub rows: u32,
    pub black_is_1: bool,
}

impl CcittParams {
    /// Parameters for streams produced by [`g4_encode`].
    pub fn for_encoded(columns: u32, rows: u32) -> Self {
        CcittParams {
            columns,
            rows,
            black_is_1: false,
        }
    }

    pub fn to_dict(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("K", -1i64);
        dict.set("Columns", self.columns as i64);
        dict.set("Rows", self.rows as i64);
        dict.set("BlackIs1", self.black_is_1);
        dict
    }
}

fn check_fax_extent(width: u32, height: u32) -> Result<(u16, u16)> {
    let columns = u16::try_from(width)
        .map_err(|_| RasterError::Encode(format!("{width} columns exceed the Group 4 limit")))?;
    let rows = u16::try_from(height)
        .map_err(|_| RasterError::Encode(format!("{height} rows exceed the Group 4 limit")))?;
    Ok((columns, rows))
}

/// Compress a packed bilevel raster with Group 4 coding.
///
/// The raster must be MSB-first; run the fill-order normalization before
/// encoding. Raster bit 1 is white, so set bits become fax white runs.
pub fn g4_encode(raster: &RasterImage) -> Result<Vec<u8>> {
    if !matches!(raster.mode(), ColorMode::Gray1) {
        return Err(RasterError::Encode(
            "Group 4 coding requires packed bilevel pixels".to_string(),
        ));
    }
    if raster.fill_order() != FillOrder::MsbFirst {
        return Err(RasterError::Encode(
            "Group 4 coding requires MSB-first rows".to_string(),
        ));
    }
    let (columns, _) = check_fax_extent(raster.width(), raster.height())?;
    let row_bytes = RasterImage::packed_row_bytes(raster.width());

    let mut encoder = Encoder::new(VecWriter::new());
    for row in raster.data().chunks_exact(row_bytes) {
        let line = (0..raster.width() as usize).map(|col| {
            let set = row[col / 8] & (0x80 >> (col % 8)) != 0;
            if set {
                Color::White
            } else {
                Color::Black
            }
        });
        encoder
            .encode_line(line, columns)
            .map_err(|_| RasterError::Encode("Group 4 coder rejected a line".to_string()))?;
    }
    let writer = encoder
        .finish()
        .map_err(|_| RasterError::Encode("Group 4 coder failed to flush".to_string()))?;
    Ok(writer.finish())
}

/// Decode a Group 4 stream into packed MSB-first bilevel rows with bit 1 as
/// white. `black_is_1` states the polarity the stream was written with.
pub fn g4_decode(data: &[u8], columns: u32, rows: u32, black_is_1: bool) -> Result<Vec<u8>> {
    let (width, height) = check_fax_extent(columns, rows)?;
    let row_bytes = RasterImage::packed_row_bytes(columns);
    let mut packed = Vec::with_capacity(row_bytes * rows as usize);

    let decoded = fax::decoder::decode_g4(
        data.iter().copied(),
        width,
        Some(height),
        |transitions| {
            let mut row = vec![0u8; row_bytes];
            for (col, color) in fax::decoder::pels(transitions, width).enumerate() {
                let white = (color == Color::White) != black_is_1;
                if white {
                    row[col / 8] |= 0x80 >> (col % 8);
                }
            }
            packed.extend_from_slice(&row);
        },
    );
    if decoded.is_none() {
        return Err(RasterError::CorruptData(
            "Group 4 stream did not decode".to_string(),
        ));
    }
    if packed.len() < row_bytes * rows as usize {
        return Err(RasterError::CorruptData(format!(
            "Group 4 stream ended after {} of {rows} rows",
            packed.len() / row_bytes.max(1)
        )));
    }
    packed.truncate(row_bytes * rows as usize);
    Ok(packed)
}
