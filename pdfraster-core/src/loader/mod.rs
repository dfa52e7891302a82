//! Image source loading and format dispatch
//!
//! Normalizes a path, a byte buffer, or a pre-decoded raster into a
//! [`DecodedSource`]: either canonical pixels or one of the compressed
//! streams that can pass through to a PDF filter untouched (JPEG, single
//! strip Group 4 TIFF, JPEG 2000). Format detection reads magic bytes,
//! never the filename.

pub(crate) mod jpeg;
pub(crate) mod jpx;
pub(crate) mod png;
pub(crate) mod tiff;

use crate::error::{RasterError, Result};
use crate::raster::{ColorMode, RasterImage};
use image::ImageDecoder;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub(crate) use jpeg::JpegInfo;
pub(crate) use jpx::JpxInfo;
pub(crate) use tiff::G4Strip;

/// Where an image comes from. Byte inputs are copied at the boundary, so a
/// caller-held buffer stays untouched and reusable after insertion.
#[derive(Debug)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Raster(RasterImage),
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&str> for ImageSource {
    fn from(path: &str) -> Self {
        ImageSource::Path(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(data: Vec<u8>) -> Self {
        ImageSource::Bytes(data)
    }
}

impl From<&[u8]> for ImageSource {
    fn from(data: &[u8]) -> Self {
        ImageSource::Bytes(data.to_vec())
    }
}

impl From<RasterImage> for ImageSource {
    fn from(raster: RasterImage) -> Self {
        ImageSource::Raster(raster)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SniffedFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    Jpx,
}

pub(crate) fn sniff_format(data: &[u8]) -> Option<SniffedFormat> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(SniffedFormat::Jpeg)
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(SniffedFormat::Png)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some(SniffedFormat::Gif)
    } else if data.starts_with(b"BM") {
        Some(SniffedFormat::Bmp)
    } else if data.starts_with(b"II\x2A\x00") || data.starts_with(b"MM\x00\x2A") {
        Some(SniffedFormat::Tiff)
    } else if data.starts_with(&jpx::JP2_SIGNATURE) || data.starts_with(&jpx::J2K_SIGNATURE) {
        Some(SniffedFormat::Jpx)
    } else {
        None
    }
}

/// A JPEG kept as its compressed stream for DCTDecode passthrough.
#[derive(Debug)]
pub(crate) struct JpegStream {
    pub data: Vec<u8>,
    pub info: JpegInfo,
}

impl JpegStream {
    /// Full pixel decode for the paths that cannot reuse the stream. The
    /// result is upright; EXIF orientation is applied here.
    pub(crate) fn decode(&self) -> Result<RasterImage> {
        decode_general(&self.data, image::ImageFormat::Jpeg)
    }
}

/// A JPEG 2000 stream kept for JPXDecode passthrough.
#[derive(Debug)]
pub(crate) struct JpxStream {
    pub data: Vec<u8>,
    pub info: JpxInfo,
}

#[derive(Debug)]
pub(crate) enum DecodedSource {
    Raster(RasterImage),
    Jpeg(JpegStream),
    Group4(G4Strip),
    Jpx(JpxStream),
}

/// A source that has been read and fingerprinted but not decoded, so the
/// cache can be consulted before any pixel work happens.
#[derive(Debug)]
pub(crate) struct PendingSource {
    pub name: String,
    pub fingerprint: String,
    payload: PendingPayload,
}

#[derive(Debug)]
enum PendingPayload {
    Bytes(Vec<u8>),
    Raster(RasterImage),
}

impl PendingSource {
    pub(crate) fn decode(self) -> Result<DecodedSource> {
        match self.payload {
            PendingPayload::Bytes(data) => decode_bytes(data, &self.name),
            PendingPayload::Raster(raster) => Ok(DecodedSource::Raster(raster)),
        }
    }
}

/// Resolve the source to bytes (or a raster) and compute its content
/// fingerprint. Decoding is deferred to [`PendingSource::decode`].
pub(crate) fn prepare(source: ImageSource) -> Result<PendingSource> {
    match source {
        ImageSource::Path(path) => {
            let data = std::fs::read(&path)?;
            Ok(PendingSource {
                name: path.display().to_string(),
                fingerprint: format!("{:x}", md5::compute(&data)),
                payload: PendingPayload::Bytes(data),
            })
        }
        ImageSource::Bytes(data) => Ok(PendingSource {
            name: "bytes".to_string(),
            fingerprint: format!("{:x}", md5::compute(&data)),
            payload: PendingPayload::Bytes(data),
        }),
        ImageSource::Raster(raster) => Ok(PendingSource {
            name: "raster".to_string(),
            fingerprint: raster_fingerprint(&raster),
            payload: PendingPayload::Raster(raster),
        }),
    }
}

fn decode_bytes(data: Vec<u8>, name: &str) -> Result<DecodedSource> {
    let format = sniff_format(&data).ok_or_else(|| {
        RasterError::UnsupportedFormat("unrecognized image data".to_string())
    })?;
    tracing::debug!(name = %name, format = ?format, "decoding image");

    Ok(match format {
        SniffedFormat::Jpeg => {
            let info = jpeg::parse_jpeg(&data)?;
            DecodedSource::Jpeg(JpegStream { data, info })
        }
        SniffedFormat::Jpx => {
            let info = jpx::parse_jpx(&data)?;
            DecodedSource::Jpx(JpxStream { data, info })
        }
        SniffedFormat::Tiff => match tiff::probe_tiff(&data)? {
            tiff::TiffProbe::Group4(strip) => DecodedSource::Group4(strip),
            tiff::TiffProbe::Cmyk(raster) => DecodedSource::Raster(raster),
            tiff::TiffProbe::Defer => {
                DecodedSource::Raster(decode_general(&data, image::ImageFormat::Tiff)?)
            }
        },
        SniffedFormat::Png => match png::probe_png(&data)? {
            png::PngProbe::Indexed(raster) | png::PngProbe::Bilevel(raster) => {
                DecodedSource::Raster(raster)
            }
            png::PngProbe::Defer => {
                DecodedSource::Raster(decode_general(&data, image::ImageFormat::Png)?)
            }
        },
        SniffedFormat::Gif => DecodedSource::Raster(decode_general(&data, image::ImageFormat::Gif)?),
        SniffedFormat::Bmp => DecodedSource::Raster(decode_general(&data, image::ImageFormat::Bmp)?),
    })
}

/// Content fingerprint of a pre-decoded raster, covering geometry, mode,
/// pixels and any alpha plane so distinct images never collide.
fn raster_fingerprint(raster: &RasterImage) -> String {
    let mut content = Vec::with_capacity(raster.data().len() + 64);
    content.extend_from_slice(&raster.width().to_be_bytes());
    content.extend_from_slice(&raster.height().to_be_bytes());
    match raster.mode() {
        ColorMode::Gray1 => content.push(1),
        ColorMode::Gray8 => content.push(2),
        ColorMode::Rgb8 => content.push(3),
        ColorMode::Rgba8 => content.push(4),
        ColorMode::Cmyk8 => content.push(5),
        ColorMode::Indexed { palette } => {
            content.push(6);
            content.extend_from_slice(palette);
        }
    }
    content.extend_from_slice(raster.data());
    if let Some(alpha) = raster.alpha() {
        content.push(0xA1);
        content.extend_from_slice(alpha);
    }
    format!("{:x}", md5::compute(&content))
}

fn map_image_error(err: image::ImageError) -> RasterError {
    match err {
        image::ImageError::Unsupported(e) => RasterError::UnsupportedFormat(e.to_string()),
        image::ImageError::IoError(e) => RasterError::Io(e),
        other => RasterError::CorruptData(other.to_string()),
    }
}

/// Decode through the `image` crate, keeping the embedded ICC profile and
/// applying any EXIF orientation so the raster comes out upright.
fn decode_general(data: &[u8], format: image::ImageFormat) -> Result<RasterImage> {
    let reader = image::ImageReader::with_format(Cursor::new(data), format);
    let mut decoder = reader.into_decoder().map_err(map_image_error)?;
    let icc = decoder.icc_profile().ok().flatten();
    let orientation = decoder.orientation().ok();
    let mut decoded = image::DynamicImage::from_decoder(decoder).map_err(map_image_error)?;
    if let Some(orientation) = orientation {
        decoded.apply_orientation(orientation);
    }
    let raster = raster_from_dynamic(decoded)?;
    Ok(match icc {
        Some(icc) => raster.with_icc_profile(icc),
        None => raster,
    })
}

fn raster_from_dynamic(decoded: image::DynamicImage) -> Result<RasterImage> {
    use image::DynamicImage;

    let (width, height) = (decoded.width(), decoded.height());
    match decoded {
        DynamicImage::ImageLuma8(buf) => RasterImage::gray8(width, height, buf.into_raw()),
        DynamicImage::ImageLumaA8(buf) => {
            let raw = buf.into_raw();
            let mut gray = Vec::with_capacity(raw.len() / 2);
            let mut alpha = Vec::with_capacity(raw.len() / 2);
            for pixel in raw.chunks_exact(2) {
                gray.push(pixel[0]);
                alpha.push(pixel[1]);
            }
            RasterImage::gray8(width, height, gray)?.with_alpha(alpha)
        }
        DynamicImage::ImageRgb8(buf) => RasterImage::rgb8(width, height, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => RasterImage::rgba8(width, height, buf.into_raw()),
        // Deeper variants are narrowed to the 8-bit layout PDF filters get
        DynamicImage::ImageLuma16(_) => {
            RasterImage::gray8(width, height, decoded.into_luma8().into_raw())
        }
        DynamicImage::ImageLumaA16(_) => {
            raster_from_dynamic(DynamicImage::ImageLumaA8(decoded.into_luma_alpha8()))
        }
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgb32F(_) => {
            RasterImage::rgb8(width, height, decoded.into_rgb8().into_raw())
        }
        DynamicImage::ImageRgba16(_) | DynamicImage::ImageRgba32F(_) => {
            RasterImage::rgba8(width, height, decoded.into_rgba8().into_raw())
        }
        other => Err(RasterError::UnsupportedFormat(format!(
            "decoded pixel layout {:?} has no PDF mapping",
            other.color()
        ))),
    }
}
