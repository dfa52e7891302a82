//! PDF filter selection and payload encoding
//!
//! Turns a loaded source into an encoded payload plus the attributes the
//! descriptor needs: the filter name, decode parameters, color space and
//! bit depth, an optional soft-mask payload, and any ICC bytes to
//! register. Automatic selection keeps compressed sources compressed
//! (DCTDecode and JPXDecode passthrough, Group 4 strip reuse), packs
//! bilevel rasters as Group 4 and deflates everything else. An explicit
//! preference either holds or fails; it never silently degrades.

pub mod ccitt;
pub mod lzw;

use crate::descriptor::ColorSpaceDescriptor;
use crate::error::{RasterError, Result};
use crate::loader::{DecodedSource, G4Strip, JpegStream, JpxStream};
use crate::objects::Dictionary;
use crate::raster::{ColorMode, RasterImage};
use crate::transcode;
use ccitt::CcittParams;
use std::io::Cursor;

/// Default quality for baseline JPEG re-encoding.
pub const DEFAULT_DCT_QUALITY: u8 = 75;

/// The PDF stream filter an encoded payload is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Dct,
    Flate,
    Lzw,
    CcittFax,
    Jpx,
}

impl Filter {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Filter::Dct => "DCTDecode",
            Filter::Flate => "FlateDecode",
            Filter::Lzw => "LZWDecode",
            Filter::CcittFax => "CCITTFaxDecode",
            Filter::Jpx => "JPXDecode",
        }
    }
}

/// Requested encoding. `Auto` picks per source; everything else is a hard
/// requirement that fails with `IncompatibleFilter` when the source cannot
/// be represented on the filter's terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterPreference {
    #[default]
    Auto,
    Dct,
    Flate,
    Lzw,
    CcittFax,
    Jpx,
}

impl FilterPreference {
    fn label(&self) -> &'static str {
        match self {
            FilterPreference::Auto => "Auto",
            FilterPreference::Dct => "DCTDecode",
            FilterPreference::Flate => "FlateDecode",
            FilterPreference::Lzw => "LZWDecode",
            FilterPreference::CcittFax => "CCITTFaxDecode",
            FilterPreference::Jpx => "JPXDecode",
        }
    }
}

/// How inverted-CMYK JPEG detection behaves. `Auto` trusts the Adobe APP14
/// marker; the other two force the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CmykInversion {
    #[default]
    Auto,
    Always,
    Never,
}

impl CmykInversion {
    fn applies(&self, adobe_app14: bool) -> bool {
        match self {
            CmykInversion::Auto => adobe_app14,
            CmykInversion::Always => true,
            CmykInversion::Never => false,
        }
    }
}

/// Effective per-insertion encoding configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EncodeConfig {
    pub filter: FilterPreference,
    pub allow_transparency: bool,
    pub cmyk_inversion: CmykInversion,
    pub dct_quality: u8,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        EncodeConfig {
            filter: FilterPreference::Auto,
            allow_transparency: true,
            cmyk_inversion: CmykInversion::Auto,
            dct_quality: DEFAULT_DCT_QUALITY,
        }
    }
}

/// Encoder output, one per image object the writer will emit.
#[derive(Debug)]
pub(crate) struct EncodedImage {
    pub filter: Filter,
    pub payload: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub color_space: ColorSpaceDescriptor,
    pub decode_parms: Option<Dictionary>,
    pub decode: Option<Vec<f64>>,
    pub mask: Option<Box<EncodedImage>>,
    pub icc: Option<Vec<u8>>,
}

/// Compress data as a FlateDecode (zlib) stream.
pub fn flate_compress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(RasterError::Io)?;
    encoder.finish().map_err(RasterError::Io)
}

/// Expand a FlateDecode stream.
pub fn flate_decompress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(RasterError::Io)?;
    Ok(decompressed)
}

/// Re-encode 8-bit gray or RGB pixels as baseline JPEG.
pub(crate) fn dct_encode(raster: &RasterImage, quality: u8) -> Result<Vec<u8>> {
    use image::codecs::jpeg::JpegEncoder;

    let color_type = match raster.mode() {
        ColorMode::Gray8 => image::ExtendedColorType::L8,
        ColorMode::Rgb8 => image::ExtendedColorType::Rgb8,
        _ => {
            return Err(RasterError::Encode(
                "JPEG re-encoding needs 8-bit gray or RGB pixels".to_string(),
            ))
        }
    };
    let mut output = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
    encoder
        .encode(raster.data(), raster.width(), raster.height(), color_type)
        .map_err(|e| RasterError::Encode(format!("JPEG encoding failed: {e}")))?;
    Ok(output.into_inner())
}

/// Select a filter for the loaded source and encode its payload.
pub(crate) fn encode_source(source: DecodedSource, config: &EncodeConfig) -> Result<EncodedImage> {
    let encoded = match source {
        DecodedSource::Jpeg(stream) => encode_jpeg_stream(stream, config)?,
        DecodedSource::Jpx(stream) => encode_jpx_stream(stream, config)?,
        DecodedSource::Group4(strip) => encode_g4_strip(strip, config)?,
        DecodedSource::Raster(raster) => encode_raster(raster, config)?,
    };
    tracing::debug!(
        filter = encoded.filter.pdf_name(),
        width = encoded.width,
        height = encoded.height,
        "encoded image payload"
    );
    Ok(encoded)
}

fn encode_jpeg_stream(stream: JpegStream, config: &EncodeConfig) -> Result<EncodedImage> {
    match config.filter {
        FilterPreference::Auto | FilterPreference::Dct => {
            if stream.info.orientation.is_upright() {
                encode_jpeg_passthrough(stream, config)
            } else {
                // A rotated frame cannot reuse the stream; re-encode upright
                let raster = stream.decode()?;
                let config = EncodeConfig {
                    filter: FilterPreference::Dct,
                    ..*config
                };
                encode_raster(raster, &config)
            }
        }
        FilterPreference::Flate | FilterPreference::Lzw => {
            let raster = stream.decode()?;
            encode_raster(raster, config)
        }
        FilterPreference::CcittFax => Err(RasterError::incompatible(
            "CCITTFaxDecode",
            "JPEG sources are not bilevel",
        )),
        FilterPreference::Jpx => Err(RasterError::incompatible(
            "JPXDecode",
            "source is not a JPEG 2000 stream",
        )),
    }
}

fn encode_jpeg_passthrough(stream: JpegStream, config: &EncodeConfig) -> Result<EncodedImage> {
    let JpegStream { data, info } = stream;
    let color_space = match info.components {
        1 => ColorSpaceDescriptor::DeviceGray,
        3 => ColorSpaceDescriptor::DeviceRgb,
        4 => ColorSpaceDescriptor::DeviceCmyk,
        other => {
            return Err(RasterError::CorruptData(format!(
                "JPEG frame with {other} components"
            )))
        }
    };
    // Adobe CMYK JPEGs store inverted ink values; the Decode array flips
    // them back at render time
    let decode = (info.components == 4 && config.cmyk_inversion.applies(info.adobe_app14))
        .then(|| vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);

    Ok(EncodedImage {
        filter: Filter::Dct,
        width: info.width,
        height: info.height,
        bits_per_component: info.bits_per_component,
        color_space,
        decode_parms: None,
        decode,
        mask: None,
        icc: info.icc,
        payload: data,
    })
}

fn encode_jpx_stream(stream: JpxStream, config: &EncodeConfig) -> Result<EncodedImage> {
    match config.filter {
        FilterPreference::Auto | FilterPreference::Jpx => {
            let info = stream.info;
            let color_space = match info.components {
                1 => ColorSpaceDescriptor::DeviceGray,
                4 => ColorSpaceDescriptor::DeviceCmyk,
                _ => ColorSpaceDescriptor::DeviceRgb,
            };
            Ok(EncodedImage {
                filter: Filter::Jpx,
                payload: stream.data,
                width: info.width,
                height: info.height,
                bits_per_component: info.bits_per_component,
                color_space,
                decode_parms: None,
                decode: None,
                mask: None,
                icc: None,
            })
        }
        other => Err(RasterError::incompatible(
            other.label(),
            "JPEG 2000 streams embed only under JPXDecode",
        )),
    }
}

fn encode_g4_strip(strip: G4Strip, config: &EncodeConfig) -> Result<EncodedImage> {
    match config.filter {
        FilterPreference::Auto | FilterPreference::CcittFax => {
            let params = CcittParams {
                columns: strip.width,
                rows: strip.height,
                black_is_1: strip.black_is_1,
            };
            Ok(EncodedImage {
                filter: Filter::CcittFax,
                width: strip.width,
                height: strip.height,
                bits_per_component: 1,
                color_space: ColorSpaceDescriptor::DeviceGray,
                decode_parms: Some(params.to_dict()),
                decode: None,
                mask: None,
                icc: None,
                payload: strip.data,
            })
        }
        FilterPreference::Flate | FilterPreference::Lzw | FilterPreference::Dct => {
            encode_raster(strip.decode()?, config)
        }
        FilterPreference::Jpx => Err(RasterError::incompatible(
            "JPXDecode",
            "source is not a JPEG 2000 stream",
        )),
    }
}

/// The raster pipeline: upright the pixels, normalize the fill order,
/// split or drop alpha, then encode under the configured filter.
fn encode_raster(raster: RasterImage, config: &EncodeConfig) -> Result<EncodedImage> {
    let raster = if raster.orientation().is_upright() {
        raster
    } else {
        transcode::apply_orientation(raster)?
    };
    let raster = transcode::normalize_fill_order(raster);

    let (mut color, mask) = if config.allow_transparency {
        transcode::split_alpha(raster)?
    } else {
        (transcode::discard_alpha(raster)?, None)
    };
    let icc = color.take_icc_profile();

    let mut encoded = encode_color_raster(color, config)?;
    encoded.icc = icc;
    if let Some(mask) = mask {
        encoded.mask = Some(Box::new(encode_mask(mask, config)?));
    }
    Ok(encoded)
}

fn encode_color_raster(raster: RasterImage, config: &EncodeConfig) -> Result<EncodedImage> {
    match config.filter {
        FilterPreference::Auto => {
            if matches!(raster.mode(), ColorMode::Gray1) {
                encode_ccitt(raster)
            } else {
                let payload = flate_compress(raster.data())?;
                finish_lossless(raster, Filter::Flate, payload)
            }
        }
        FilterPreference::Flate => {
            let payload = flate_compress(raster.data())?;
            finish_lossless(raster, Filter::Flate, payload)
        }
        FilterPreference::Lzw => {
            // The Indexed color space is only kept on the Flate path
            let raster = if matches!(raster.mode(), ColorMode::Indexed { .. }) {
                transcode::expand_indexed(&raster)?
            } else {
                raster
            };
            let payload = lzw::lzw_encode(raster.data())?;
            finish_lossless(raster, Filter::Lzw, payload)
        }
        FilterPreference::CcittFax => {
            if matches!(raster.mode(), ColorMode::Gray1) {
                encode_ccitt(raster)
            } else {
                Err(RasterError::incompatible(
                    "CCITTFaxDecode",
                    "source image is not bilevel",
                ))
            }
        }
        FilterPreference::Dct => encode_dct_raster(raster, config.dct_quality),
        FilterPreference::Jpx => Err(RasterError::incompatible(
            "JPXDecode",
            "source is not a JPEG 2000 stream",
        )),
    }
}

fn encode_ccitt(raster: RasterImage) -> Result<EncodedImage> {
    let payload = ccitt::g4_encode(&raster)?;
    let params = CcittParams::for_encoded(raster.width(), raster.height());
    Ok(EncodedImage {
        filter: Filter::CcittFax,
        width: raster.width(),
        height: raster.height(),
        bits_per_component: 1,
        color_space: ColorSpaceDescriptor::DeviceGray,
        decode_parms: Some(params.to_dict()),
        decode: None,
        mask: None,
        icc: None,
        payload,
    })
}

fn encode_dct_raster(raster: RasterImage, quality: u8) -> Result<EncodedImage> {
    let gray8 = match raster.mode() {
        ColorMode::Gray1 => {
            let gray = transcode::unpack_bilevel(&raster)?;
            Some(RasterImage::gray8(raster.width(), raster.height(), gray)?)
        }
        ColorMode::Indexed { .. } => Some(transcode::expand_indexed(&raster)?),
        ColorMode::Cmyk8 => {
            return Err(RasterError::incompatible(
                "DCTDecode",
                "CMYK rasters cannot be re-encoded as baseline JPEG",
            ))
        }
        ColorMode::Rgba8 => {
            return Err(RasterError::Encode(
                "alpha plane must be split before encoding".to_string(),
            ))
        }
        ColorMode::Gray8 | ColorMode::Rgb8 => None,
    };
    let raster = gray8.unwrap_or(raster);
    let payload = dct_encode(&raster, quality)?;
    finish_lossless(raster, Filter::Dct, payload)
}

fn encode_mask(mask: RasterImage, config: &EncodeConfig) -> Result<EncodedImage> {
    match config.filter {
        FilterPreference::Dct => {
            let payload = dct_encode(&mask, config.dct_quality)?;
            finish_lossless(mask, Filter::Dct, payload)
        }
        _ => {
            let payload = flate_compress(mask.data())?;
            finish_lossless(mask, Filter::Flate, payload)
        }
    }
}

fn finish_lossless(raster: RasterImage, filter: Filter, payload: Vec<u8>) -> Result<EncodedImage> {
    let (color_space, bits_per_component) = device_color_space(raster.mode())?;
    Ok(EncodedImage {
        filter,
        width: raster.width(),
        height: raster.height(),
        bits_per_component,
        color_space,
        decode_parms: None,
        decode: None,
        mask: None,
        icc: None,
        payload,
    })
}

fn device_color_space(mode: &ColorMode) -> Result<(ColorSpaceDescriptor, u8)> {
    Ok(match mode {
        ColorMode::Gray1 => (ColorSpaceDescriptor::DeviceGray, 1),
        ColorMode::Gray8 => (ColorSpaceDescriptor::DeviceGray, 8),
        ColorMode::Rgb8 => (ColorSpaceDescriptor::DeviceRgb, 8),
        ColorMode::Cmyk8 => (ColorSpaceDescriptor::DeviceCmyk, 8),
        ColorMode::Indexed { palette } => (
            ColorSpaceDescriptor::Indexed {
                hival: (palette.len() / 3 - 1) as u8,
                palette: palette.clone(),
            },
            8,
        ),
        ColorMode::Rgba8 => {
            return Err(RasterError::Encode(
                "alpha plane must be split before encoding".to_string(),
            ))
        }
    })
}
