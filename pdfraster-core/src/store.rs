//! Per-document image store with content-addressed deduplication
//!
//! The store owns every image object and ICC profile a document build
//! produces. Insertions are memoized by the source's content fingerprint
//! combined with the effective encoding configuration, so bit-identical
//! inserts return the same `Arc` and transcode at most once. A single
//! mutex guards the whole insert, which makes that guarantee hold across
//! threads at the cost of serializing concurrent inserts.

use crate::descriptor::{ImageId, ImageObjectDescriptor};
use crate::error::Result;
use crate::filters::{
    self, CmykInversion, EncodeConfig, FilterPreference, DEFAULT_DCT_QUALITY,
};
use crate::icc::{is_icc_profile_valid, IccId, IccProfile, IccRegistry};
use crate::loader::{self, ImageSource};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Store-level defaults, applied when an insertion does not override them.
#[derive(Debug, Clone, Copy)]
pub struct ImageStoreOptions {
    /// Filter used by insertions that do not pick their own.
    pub filter: FilterPreference,
    /// Whether alpha channels become soft masks by default.
    pub allow_transparency: bool,
    /// Inverted-CMYK JPEG detection policy.
    pub cmyk_inversion: CmykInversion,
    /// Quality for baseline JPEG re-encoding, 1 through 100.
    pub dct_quality: u8,
}

impl Default for ImageStoreOptions {
    fn default() -> Self {
        ImageStoreOptions {
            filter: FilterPreference::Auto,
            allow_transparency: true,
            cmyk_inversion: CmykInversion::Auto,
            dct_quality: DEFAULT_DCT_QUALITY,
        }
    }
}

/// Per-insertion encoding choices.
#[derive(Debug, Clone, Copy)]
pub struct InsertOptions {
    pub filter: FilterPreference,
    pub allow_transparency: bool,
}

impl InsertOptions {
    pub fn with_filter(filter: FilterPreference) -> Self {
        InsertOptions {
            filter,
            allow_transparency: true,
        }
    }
}

// Must agree with `ImageStoreOptions::default()`: transparency is on
// unless a caller turns it off.
impl Default for InsertOptions {
    fn default() -> Self {
        InsertOptions {
            filter: FilterPreference::Auto,
            allow_transparency: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fingerprint: String,
    filter: FilterPreference,
    allow_transparency: bool,
    cmyk_inversion: CmykInversion,
    dct_quality: u8,
}

impl CacheKey {
    fn new(fingerprint: String, config: &EncodeConfig) -> Self {
        CacheKey {
            fingerprint,
            filter: config.filter,
            allow_transparency: config.allow_transparency,
            cmyk_inversion: config.cmyk_inversion,
            dct_quality: config.dct_quality,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    cache: HashMap<CacheKey, Arc<ImageObjectDescriptor>>,
    images: Vec<Arc<ImageObjectDescriptor>>,
    icc: IccRegistry,
    warnings: Vec<String>,
    next_id: u32,
}

impl StoreInner {
    fn allocate_id(&mut self) -> ImageId {
        self.next_id += 1;
        ImageId(self.next_id)
    }
}

/// Image and ICC-profile store for one document build.
#[derive(Debug, Default)]
pub struct ImageStore {
    inner: Mutex<StoreInner>,
    options: ImageStoreOptions,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ImageStoreOptions) -> Self {
        ImageStore {
            inner: Mutex::new(StoreInner::default()),
            options,
        }
    }

    pub fn options(&self) -> &ImageStoreOptions {
        &self.options
    }

    /// Insert an image under the store's default options.
    pub fn insert_image(
        &self,
        source: impl Into<ImageSource>,
    ) -> Result<Arc<ImageObjectDescriptor>> {
        let options = InsertOptions {
            filter: self.options.filter,
            allow_transparency: self.options.allow_transparency,
        };
        self.insert_image_with_options(source, &options)
    }

    /// Insert an image, returning the cached descriptor when the same
    /// content was already inserted under the same effective options.
    pub fn insert_image_with_options(
        &self,
        source: impl Into<ImageSource>,
        options: &InsertOptions,
    ) -> Result<Arc<ImageObjectDescriptor>> {
        let config = EncodeConfig {
            filter: options.filter,
            allow_transparency: options.allow_transparency,
            cmyk_inversion: self.options.cmyk_inversion,
            dct_quality: self.options.dct_quality,
        };

        // One lock around fingerprint, cache lookup and transcode keeps
        // concurrent inserts of the same content down to a single encode
        let mut inner = self.lock();
        let pending = loader::prepare(source.into())?;
        let key = CacheKey::new(pending.fingerprint.clone(), &config);
        if let Some(hit) = inner.cache.get(&key) {
            tracing::debug!(fingerprint = %key.fingerprint, "image cache hit");
            return Ok(Arc::clone(hit));
        }

        let name = pending.name.clone();
        let decoded = pending.decode()?;
        let mut encoded = filters::encode_source(decoded, &config)?;

        let id = inner.allocate_id();
        let soft_mask = match encoded.mask.take() {
            Some(mask) => Some(Arc::new(ImageObjectDescriptor::from_encoded(
                inner.allocate_id(),
                *mask,
                None,
                None,
            ))),
            None => None,
        };
        let icc = match encoded.icc.take() {
            Some(data) if is_icc_profile_valid(&data) => {
                let components = encoded.color_space.base_components();
                Some(inner.icc.register(data, components))
            }
            Some(_) => {
                let warning = format!("Invalid ICC Profile in file {name}");
                tracing::warn!(name = %name, "invalid ICC profile dropped");
                inner.warnings.push(warning);
                None
            }
            None => None,
        };

        let descriptor = Arc::new(ImageObjectDescriptor::from_encoded(
            id, encoded, soft_mask, icc,
        ));
        inner.cache.insert(key, Arc::clone(&descriptor));
        inner.images.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Unique image descriptors in first-insertion order. Soft masks hang
    /// off their owner's descriptor and are not repeated here.
    pub fn images(&self) -> Vec<Arc<ImageObjectDescriptor>> {
        self.lock().images.clone()
    }

    /// Registered ICC profiles in first-registration order.
    pub fn icc_profiles(&self) -> Vec<(IccId, Arc<IccProfile>)> {
        self.lock().icc.profiles().to_vec()
    }

    /// Warnings collected from recoverable defects, such as a corrupt
    /// embedded ICC profile.
    pub fn warnings(&self) -> Vec<String> {
        self.lock().warnings.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().images.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        // Inner state is only mutated after a full successful insert, so
        // it stays usable even if another thread panicked mid-insert
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ColorSpaceDescriptor;
    use crate::filters::Filter;
    use crate::raster::RasterImage;

    fn rgb_square(shade: u8) -> RasterImage {
        RasterImage::rgb8(2, 2, vec![shade; 12]).unwrap()
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let store = ImageStore::new();
        let first = store.insert_image(rgb_square(10)).unwrap();
        let second = store.insert_image(rgb_square(20)).unwrap();
        assert_eq!(first.id().get(), 1);
        assert_eq!(second.id().get(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_identical_inserts_share_descriptor() {
        let store = ImageStore::new();
        let first = store.insert_image(rgb_square(10)).unwrap();
        let second = store.insert_image(rgb_square(10)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_filter_change_breaks_sharing() {
        let store = ImageStore::new();
        let auto = store.insert_image(rgb_square(10)).unwrap();
        let lzw = store
            .insert_image_with_options(
                rgb_square(10),
                &InsertOptions::with_filter(FilterPreference::Lzw),
            )
            .unwrap();
        assert!(!Arc::ptr_eq(&auto, &lzw));
        assert_eq!(auto.filter(), Filter::Flate);
        assert_eq!(lzw.filter(), Filter::Lzw);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_mask_gets_its_own_id() {
        let store = ImageStore::new();
        let rgba = RasterImage::rgba8(2, 1, vec![1, 2, 3, 40, 5, 6, 7, 80]).unwrap();
        let descriptor = store.insert_image(rgba).unwrap();
        let mask = descriptor.soft_mask().expect("soft mask");
        assert_eq!(descriptor.id().get(), 1);
        assert_eq!(mask.id().get(), 2);
        assert_eq!(mask.color_space(), &ColorSpaceDescriptor::DeviceGray);
        // The mask is reachable through its owner, not listed separately
        assert_eq!(store.len(), 1);

        let next = store.insert_image(rgb_square(10)).unwrap();
        assert_eq!(next.id().get(), 3);
    }

    #[test]
    fn test_transparency_flag_is_part_of_the_key() {
        let store = ImageStore::new();
        let rgba = || RasterImage::rgba8(1, 1, vec![9, 9, 9, 128]).unwrap();
        let masked = store.insert_image(rgba()).unwrap();
        let flattened = store
            .insert_image_with_options(
                rgba(),
                &InsertOptions {
                    filter: FilterPreference::Auto,
                    allow_transparency: false,
                },
            )
            .unwrap();
        assert!(masked.soft_mask().is_some());
        assert!(flattened.soft_mask().is_none());
        assert!(!Arc::ptr_eq(&masked, &flattened));
    }

    #[test]
    fn test_default_insert_options_keep_transparency() {
        assert!(InsertOptions::default().allow_transparency);

        let store = ImageStore::new();
        let rgba = RasterImage::rgba8(1, 1, vec![9, 9, 9, 128]).unwrap();
        let image = store
            .insert_image_with_options(rgba, &InsertOptions::default())
            .unwrap();
        assert!(image.soft_mask().is_some());
    }

    #[test]
    fn test_failed_insert_leaves_store_clean() {
        let store = ImageStore::new();
        store.insert_image(rgb_square(10)).unwrap();
        let result = store.insert_image_with_options(
            rgb_square(20),
            &InsertOptions::with_filter(FilterPreference::CcittFax),
        );
        assert!(result.is_err());
        assert_eq!(store.len(), 1);

        // The failing key was not cached; a compatible retry succeeds
        let retry = store
            .insert_image_with_options(
                rgb_square(20),
                &InsertOptions::with_filter(FilterPreference::Flate),
            )
            .unwrap();
        assert_eq!(retry.id().get(), 2);
    }

    fn valid_icc(seed: u8) -> Vec<u8> {
        let mut data = vec![seed; 160];
        data[..4].copy_from_slice(&160u32.to_be_bytes());
        data[36..40].copy_from_slice(b"acsp");
        data
    }

    #[test]
    fn test_icc_registered_once_across_images() {
        let store = ImageStore::new();
        let icc = valid_icc(0);
        let a = store
            .insert_image(rgb_square(10).with_icc_profile(icc.clone()))
            .unwrap();
        let b = store
            .insert_image(rgb_square(20).with_icc_profile(icc))
            .unwrap();

        let (id_a, profile_a) = a.icc_profile().expect("profile");
        let (id_b, profile_b) = b.icc_profile().expect("profile");
        assert_eq!(id_a, id_b);
        assert!(Arc::ptr_eq(profile_a, profile_b));
        assert_eq!(store.icc_profiles().len(), 1);
        assert_eq!(profile_a.components(), 3);
    }

    #[test]
    fn test_corrupt_icc_becomes_warning() {
        let store = ImageStore::new();
        let descriptor = store
            .insert_image(rgb_square(10).with_icc_profile(vec![0u8; 64]))
            .unwrap();
        assert!(descriptor.icc_profile().is_none());
        let warnings = store.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Invalid ICC Profile in file"));
    }

    #[test]
    fn test_store_options_feed_defaults() {
        let store = ImageStore::with_options(ImageStoreOptions {
            allow_transparency: false,
            ..ImageStoreOptions::default()
        });
        let rgba = RasterImage::rgba8(1, 1, vec![1, 2, 3, 4]).unwrap();
        let descriptor = store.insert_image(rgba).unwrap();
        assert!(descriptor.soft_mask().is_none());
    }

    #[test]
    fn test_store_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ImageStore>();
        assert_send_sync::<Arc<ImageObjectDescriptor>>();
    }
}
