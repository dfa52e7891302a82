//! LZWDecode payload compression
//!
//! PDF LZW with the default `EarlyChange 1` code-width switch, which is the
//! TIFF convention weezl implements with `with_tiff_size_switch`.

use crate::error::{RasterError, Result};

/// Compress data as an LZWDecode stream (EarlyChange 1, MSB-first codes).
pub fn lzw_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
    encoder
        .encode(data)
        .map_err(|e| RasterError::Encode(format!("LZW compression failed: {:?}", e)))
}

/// Expand an LZWDecode stream produced by [`lzw_encode`].
pub fn lzw_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
    decoder
        .decode(data)
        .map_err(|e| RasterError::CorruptData(format!("LZW stream: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lzw_round_trip() {
        let original = b"ABCABCABCABCABCABCABC";
        let compressed = lzw_encode(original).unwrap();
        let restored = lzw_decode(&compressed).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_lzw_compresses_repetitive_pixels() {
        let row = vec![0x7Fu8; 4096];
        let compressed = lzw_encode(&row).unwrap();
        assert!(compressed.len() < row.len() / 4);
        assert_eq!(lzw_decode(&compressed).unwrap(), row);
    }

    #[test]
    fn test_lzw_empty_input() {
        let compressed = lzw_encode(&[]).unwrap();
        assert_eq!(lzw_decode(&compressed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_lzw_decode_garbage_fails() {
        assert!(lzw_decode(&[0xFF, 0x00, 0x13, 0x37]).is_err());
    }
}
