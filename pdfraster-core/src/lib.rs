//! # pdfraster
//!
//! Image-to-PDF-object transcoding in pure Rust: turn JPEG, PNG, TIFF, BMP
//! and GIF sources into encoded PDF image XObjects a document writer embeds
//! verbatim.
//!
//! ## Features
//!
//! - **Filter selection**: DCTDecode and JPXDecode passthrough, FlateDecode,
//!   LZWDecode, and CCITTFaxDecode Group 4 for bilevel images
//! - **Passthrough**: already-compressed JPEG, JPEG 2000 and Group 4 TIFF
//!   streams embed byte-identical, never re-compressed
//! - **Color handling**: Gray, RGB, CMYK, indexed palettes and 1-bit images
//!   with MSB fill-order normalization
//! - **Transparency**: alpha channels split into 8-bit DeviceGray soft masks
//! - **ICC profiles**: validated, embedded and deduplicated per document
//! - **Deduplication**: repeated insertions of identical content share one
//!   image object, safe across threads
//!
//! ## Quick Start
//!
//! ```rust
//! use pdfraster::{ImageStore, RasterImage};
//!
//! # fn main() -> pdfraster::Result<()> {
//! let store = ImageStore::new();
//!
//! // Pre-decoded pixels; paths and byte buffers work the same way
//! let raster = RasterImage::rgb8(2, 2, vec![0u8; 12])?;
//! let image = store.insert_image(raster)?;
//!
//! assert_eq!(image.filter().pdf_name(), "FlateDecode");
//! assert_eq!((image.width(), image.height()), (2, 2));
//!
//! // The writer serializes each unique object exactly once
//! for descriptor in store.images() {
//!     let _attributes = descriptor.attributes();
//!     let _stream = descriptor.payload();
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Loading from files or buffers detects the format from magic bytes:
//!
//! ```rust,no_run
//! use pdfraster::{FilterPreference, ImageStore, InsertOptions};
//!
//! # fn main() -> pdfraster::Result<()> {
//! let store = ImageStore::new();
//! let photo = store.insert_image("photo.jpg")?;
//! let scan = store.insert_image_with_options(
//!     std::fs::read("scan.tif")?,
//!     &InsertOptions::with_filter(FilterPreference::CcittFax),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`store`] - Per-document image store, deduplication and warnings
//! - [`descriptor`] - Image object descriptors handed to the writer
//! - [`loader`] - Format detection and source loading
//! - [`raster`] - Decoded pixel buffers and color modes
//! - [`transcode`] - Bit packing, fill order, alpha and palette transforms
//! - [`filters`] - Payload encoding for each PDF stream filter
//! - [`icc`] - ICC profile validation and registration
//! - [`objects`] - Minimal PDF object primitives for the writer handoff

pub mod descriptor;
pub mod error;
pub mod filters;
pub mod icc;
pub mod loader;
pub mod objects;
pub mod raster;
pub mod store;
pub mod transcode;

// Re-export the insertion surface
pub use loader::ImageSource;
pub use store::{ImageStore, ImageStoreOptions, InsertOptions};

// Re-export descriptor types the writer consumes
pub use descriptor::{ColorSpaceDescriptor, ImageId, ImageObjectDescriptor};
pub use icc::{IccId, IccProfile};
pub use objects::{Dictionary, Object};

// Re-export configuration and source types
pub use error::{RasterError, Result};
pub use filters::{CmykInversion, Filter, FilterPreference, DEFAULT_DCT_QUALITY};
pub use raster::{ColorMode, FillOrder, Orientation, RasterImage};

/// Current version of pdfraster
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version_is_set() {
        assert!(!super::VERSION.is_empty());
    }
}
