//! Canonical in-memory raster representation
//!
//! Every image source is normalized into a [`RasterImage`] before color or
//! bit transcoding (pass-through payloads such as raw JPEG streams skip this
//! stage entirely). The pixel buffer is row-major. `Gray1` rows are packed
//! eight pixels per byte and padded to a byte boundary, with bit 1 meaning
//! white, the DeviceGray convention. `Rgba8` keeps the alpha interleaved as
//! decoded; grayscale-with-alpha sources store the extra plane in `alpha`.

use crate::error::{RasterError, Result};

/// Bit-packing order for bilevel data, inherited from TIFF FillOrder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOrder {
    /// Bit 7 of each byte is the leftmost pixel (TIFF FillOrder 1, PDF order).
    MsbFirst,
    /// Bit 0 of each byte is the leftmost pixel (TIFF FillOrder 2).
    LsbFirst,
}

/// EXIF orientation of the pixel data relative to its upright display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Upright,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Map an EXIF orientation tag value (1 through 8) to a variant.
    pub fn from_exif(value: u16) -> Option<Self> {
        match value {
            1 => Some(Orientation::Upright),
            2 => Some(Orientation::FlipHorizontal),
            3 => Some(Orientation::Rotate180),
            4 => Some(Orientation::FlipVertical),
            5 => Some(Orientation::Transpose),
            6 => Some(Orientation::Rotate90),
            7 => Some(Orientation::Transverse),
            8 => Some(Orientation::Rotate270),
            _ => None,
        }
    }

    pub fn is_upright(&self) -> bool {
        matches!(self, Orientation::Upright)
    }

    /// True when the transform swaps image width and height.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90
                | Orientation::Transverse
                | Orientation::Rotate270
        )
    }
}

/// Pixel layout of a [`RasterImage`] buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorMode {
    /// 1-bit grayscale, packed rows, bit 1 = white.
    Gray1,
    /// 8-bit grayscale, one byte per pixel.
    Gray8,
    /// 8-bit RGB, three bytes per pixel.
    Rgb8,
    /// 8-bit RGBA, four bytes per pixel, alpha interleaved.
    Rgba8,
    /// 8-bit CMYK, four bytes per pixel, Adobe channel order.
    Cmyk8,
    /// 8-bit palette indices, one byte per pixel; palette is RGB triplets.
    Indexed { palette: Vec<u8> },
}

impl ColorMode {
    /// Bits per color component as declared in the PDF image dictionary.
    pub fn bits_per_component(&self) -> u8 {
        match self {
            ColorMode::Gray1 => 1,
            _ => 8,
        }
    }

    /// Number of color components, alpha excluded.
    pub fn color_components(&self) -> u8 {
        match self {
            ColorMode::Gray1 | ColorMode::Gray8 | ColorMode::Indexed { .. } => 1,
            ColorMode::Rgb8 | ColorMode::Rgba8 => 3,
            ColorMode::Cmyk8 => 4,
        }
    }

    /// Bytes per pixel of the stored buffer, `None` for sub-byte packing.
    fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            ColorMode::Gray1 => None,
            ColorMode::Gray8 | ColorMode::Indexed { .. } => Some(1),
            ColorMode::Rgb8 => Some(3),
            ColorMode::Rgba8 | ColorMode::Cmyk8 => Some(4),
        }
    }
}

/// A decoded raster plus the metadata the transcoder needs.
#[derive(Debug, Clone)]
pub struct RasterImage {
    width: u32,
    height: u32,
    mode: ColorMode,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
    icc: Option<Vec<u8>>,
    fill_order: FillOrder,
    orientation: Orientation,
}

impl RasterImage {
    fn validated(
        width: u32,
        height: u32,
        mode: ColorMode,
        data: Vec<u8>,
        fill_order: FillOrder,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RasterError::CorruptData(format!(
                "raster dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = match mode.bytes_per_pixel() {
            Some(bpp) => (width as usize)
                .checked_mul(height as usize)
                .and_then(|pixels| pixels.checked_mul(bpp)),
            None => Self::packed_row_bytes(width).checked_mul(height as usize),
        }
        .ok_or_else(|| {
            RasterError::CorruptData(format!(
                "raster dimensions {width}x{height} overflow the buffer size"
            ))
        })?;
        if data.len() != expected {
            return Err(RasterError::CorruptData(format!(
                "raster buffer is {} bytes, expected {} for {width}x{height}",
                data.len(),
                expected
            )));
        }
        if let ColorMode::Indexed { palette } = &mode {
            if palette.is_empty() || palette.len() % 3 != 0 || palette.len() > 256 * 3 {
                return Err(RasterError::CorruptData(format!(
                    "palette must hold 1 to 256 RGB entries, got {} bytes",
                    palette.len()
                )));
            }
        }
        Ok(RasterImage {
            width,
            height,
            mode,
            data,
            alpha: None,
            icc: None,
            fill_order,
            orientation: Orientation::Upright,
        })
    }

    /// 8-bit grayscale from a `width * height` buffer.
    pub fn gray8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::validated(width, height, ColorMode::Gray8, data, FillOrder::MsbFirst)
    }

    /// 8-bit RGB from a `width * height * 3` interleaved buffer.
    pub fn rgb8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::validated(width, height, ColorMode::Rgb8, data, FillOrder::MsbFirst)
    }

    /// 8-bit RGBA from a `width * height * 4` interleaved buffer.
    pub fn rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::validated(width, height, ColorMode::Rgba8, data, FillOrder::MsbFirst)
    }

    /// 8-bit CMYK from a `width * height * 4` interleaved buffer.
    pub fn cmyk8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::validated(width, height, ColorMode::Cmyk8, data, FillOrder::MsbFirst)
    }

    /// Packed bilevel rows, one byte boundary per row.
    pub fn gray1_packed(
        width: u32,
        height: u32,
        data: Vec<u8>,
        fill_order: FillOrder,
    ) -> Result<Self> {
        Self::validated(width, height, ColorMode::Gray1, data, fill_order)
    }

    /// 8-bit palette indices with an RGB palette of up to 256 entries.
    pub fn indexed(width: u32, height: u32, palette: Vec<u8>, data: Vec<u8>) -> Result<Self> {
        Self::validated(
            width,
            height,
            ColorMode::Indexed { palette },
            data,
            FillOrder::MsbFirst,
        )
    }

    /// Attach a separate 8-bit alpha plane (`width * height` bytes).
    pub fn with_alpha(mut self, alpha: Vec<u8>) -> Result<Self> {
        if matches!(self.mode, ColorMode::Gray1 | ColorMode::Indexed { .. }) {
            return Err(RasterError::CorruptData(
                "alpha planes are not supported for packed or indexed rasters".to_string(),
            ));
        }
        let expected = (self.width as usize) * (self.height as usize);
        if alpha.len() != expected {
            return Err(RasterError::CorruptData(format!(
                "alpha plane is {} bytes, expected {expected}",
                alpha.len()
            )));
        }
        self.alpha = Some(alpha);
        Ok(self)
    }

    /// Attach an embedded ICC profile. The bytes are validated later, at
    /// registration time, so a bad profile degrades to a warning instead of
    /// failing construction.
    pub fn with_icc_profile(mut self, icc: Vec<u8>) -> Self {
        self.icc = Some(icc);
        self
    }

    /// Declare the EXIF orientation of the stored pixels.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mode(&self) -> &ColorMode {
        &self.mode
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn alpha(&self) -> Option<&[u8]> {
        self.alpha.as_deref()
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc.as_deref()
    }

    pub fn take_icc_profile(&mut self) -> Option<Vec<u8>> {
        self.icc.take()
    }

    pub fn fill_order(&self) -> FillOrder {
        self.fill_order
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn bits_per_component(&self) -> u8 {
        self.mode.bits_per_component()
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self.mode, ColorMode::Rgba8) || self.alpha.is_some()
    }

    /// Bytes per packed bilevel row for a given width.
    pub fn packed_row_bytes(width: u32) -> usize {
        (width as usize).div_ceil(8)
    }

    pub(crate) fn set_fill_order(&mut self, fill_order: FillOrder) {
        self.fill_order = fill_order;
    }

    pub(crate) fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    pub(crate) fn replace_buffer(&mut self, width: u32, height: u32, data: Vec<u8>) {
        self.width = width;
        self.height = height;
        self.data = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray8_construction() {
        let img = RasterImage::gray8(4, 3, vec![0u8; 12]).unwrap();
        assert_eq!(img.width(), 4);
        assert_eq!(img.height(), 3);
        assert_eq!(img.bits_per_component(), 8);
        assert_eq!(img.mode().color_components(), 1);
        assert!(!img.has_alpha());
    }

    #[test]
    fn test_buffer_length_mismatch() {
        let result = RasterImage::rgb8(4, 3, vec![0u8; 11]);
        assert!(matches!(result, Err(RasterError::CorruptData(_))));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let result = RasterImage::gray8(0, 3, vec![]);
        assert!(matches!(result, Err(RasterError::CorruptData(_))));
    }

    #[test]
    fn test_dimension_overflow_rejected() {
        // 0x8000_0000 squared times four bytes per pixel is exactly 2^64;
        // an empty buffer must not slip through on the wrapped size
        let result = RasterImage::cmyk8(0x8000_0000, 0x8000_0000, Vec::new());
        assert!(matches!(result, Err(RasterError::CorruptData(_))));
    }

    #[test]
    fn test_gray1_row_padding() {
        // 10 pixels per row need 2 bytes
        assert_eq!(RasterImage::packed_row_bytes(10), 2);
        let img = RasterImage::gray1_packed(10, 4, vec![0u8; 8], FillOrder::MsbFirst).unwrap();
        assert_eq!(img.bits_per_component(), 1);
        assert_eq!(img.fill_order(), FillOrder::MsbFirst);
    }

    #[test]
    fn test_rgba_has_alpha() {
        let img = RasterImage::rgba8(2, 2, vec![0u8; 16]).unwrap();
        assert!(img.has_alpha());
        assert_eq!(img.mode().color_components(), 3);
    }

    #[test]
    fn test_gray_with_alpha_plane() {
        let img = RasterImage::gray8(2, 2, vec![10, 20, 30, 40])
            .unwrap()
            .with_alpha(vec![255, 0, 128, 255])
            .unwrap();
        assert!(img.has_alpha());
        assert_eq!(img.alpha().unwrap(), &[255, 0, 128, 255]);
    }

    #[test]
    fn test_alpha_rejected_for_indexed() {
        let img = RasterImage::indexed(2, 1, vec![0, 0, 0, 255, 255, 255], vec![0, 1]).unwrap();
        assert!(img.with_alpha(vec![255, 255]).is_err());
    }

    #[test]
    fn test_palette_validation() {
        // Not a multiple of 3
        assert!(RasterImage::indexed(1, 1, vec![0, 0], vec![0]).is_err());
        // Too many entries
        assert!(RasterImage::indexed(1, 1, vec![0u8; 257 * 3], vec![0]).is_err());
    }

    #[test]
    fn test_orientation_from_exif() {
        assert_eq!(Orientation::from_exif(1), Some(Orientation::Upright));
        assert_eq!(Orientation::from_exif(6), Some(Orientation::Rotate90));
        assert_eq!(Orientation::from_exif(8), Some(Orientation::Rotate270));
        assert_eq!(Orientation::from_exif(0), None);
        assert_eq!(Orientation::from_exif(9), None);
    }

    #[test]
    fn test_orientation_dimension_swap() {
        assert!(Orientation::Rotate90.swaps_dimensions());
        assert!(Orientation::Transpose.swaps_dimensions());
        assert!(!Orientation::Rotate180.swaps_dimensions());
        assert!(!Orientation::Upright.swaps_dimensions());
    }

    #[test]
    fn test_icc_attachment() {
        let img = RasterImage::gray8(1, 1, vec![0]).unwrap().with_icc_profile(vec![1, 2, 3]);
        assert_eq!(img.icc_profile(), Some(&[1u8, 2, 3][..]));
    }
}
