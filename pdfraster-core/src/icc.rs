//! ICC profile validation and per-document registration
//!
//! Embedded profiles are deduplicated by content fingerprint so a profile
//! shared by several images is stored once and referenced everywhere. A
//! profile that fails the header checks is dropped with a warning rather
//! than failing the insertion; the image is still valid without it.

use crate::objects::Dictionary;
use std::collections::HashMap;
use std::sync::Arc;

/// ICC.1 profile header length in bytes.
pub const ICC_HEADER_LEN: usize = 128;

/// Offset of the `acsp` file signature within the profile header.
const ICC_SIGNATURE_OFFSET: usize = 36;

/// Check an ICC profile header: minimum length, the `acsp` signature at
/// offset 36, and a declared size that matches the actual byte count.
pub fn is_icc_profile_valid(data: &[u8]) -> bool {
    if data.len() < ICC_HEADER_LEN {
        return false;
    }
    if &data[ICC_SIGNATURE_OFFSET..ICC_SIGNATURE_OFFSET + 4] != b"acsp" {
        return false;
    }
    let declared = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    declared == data.len()
}

/// Per-document identifier of a registered profile, assigned in
/// first-registration order starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IccId(u32);

impl IccId {
    pub fn get(&self) -> u32 {
        self.0
    }
}

/// A registered ICC profile, shared by reference across descriptors.
#[derive(Debug)]
pub struct IccProfile {
    data: Vec<u8>,
    fingerprint: String,
    components: u8,
}

impl IccProfile {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Component count of the color space the profile describes, taken from
    /// the image it was embedded in.
    pub fn components(&self) -> u8 {
        self.components
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Alternate device color space for the ICCBased stream dictionary.
    pub fn alternate_name(&self) -> &'static str {
        match self.components {
            1 => "DeviceGray",
            4 => "DeviceCMYK",
            _ => "DeviceRGB",
        }
    }

    /// Attributes of the ICCBased stream object the writer emits.
    pub fn stream_dict(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("N", self.components as i64);
        dict.set(
            "Alternate",
            crate::objects::Object::name(self.alternate_name()),
        );
        dict
    }
}

/// Content-addressed profile store for one document build.
#[derive(Debug, Default)]
pub(crate) struct IccRegistry {
    by_fingerprint: HashMap<String, usize>,
    profiles: Vec<(IccId, Arc<IccProfile>)>,
}

impl IccRegistry {
    /// Register profile bytes, reusing the existing entry when the content
    /// fingerprint is already known.
    pub fn register(&mut self, data: Vec<u8>, components: u8) -> (IccId, Arc<IccProfile>) {
        let fingerprint = format!("{:x}", md5::compute(&data));
        if let Some(&index) = self.by_fingerprint.get(&fingerprint) {
            let (id, profile) = &self.profiles[index];
            return (*id, Arc::clone(profile));
        }
        let id = IccId(self.profiles.len() as u32 + 1);
        let profile = Arc::new(IccProfile {
            data,
            fingerprint: fingerprint.clone(),
            components,
        });
        self.by_fingerprint.insert(fingerprint, self.profiles.len());
        self.profiles.push((id, Arc::clone(&profile)));
        (id, profile)
    }

    /// Registered profiles in first-registration order.
    pub fn profiles(&self) -> &[(IccId, Arc<IccProfile>)] {
        &self.profiles
    }
}
