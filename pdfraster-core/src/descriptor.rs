//! Image object descriptors handed to the document writer
//!
//! A descriptor bundles everything the writer needs to emit one image
//! XObject: the encoded payload, the attribute dictionary, and references
//! to the soft-mask descriptor and registered ICC profile. Indirect
//! object numbering stays on the writer side; descriptors carry a
//! per-document sequential id instead.

use crate::filters::{EncodedImage, Filter};
use crate::icc::{IccId, IccProfile};
use crate::objects::{Dictionary, Object};
use std::sync::Arc;

/// Per-document sequential identifier for an emitted image object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub(crate) u32);

impl ImageId {
    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Color space the encoded payload samples are declared in.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpaceDescriptor {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    /// Palette of packed RGB triplets; sample values index into it.
    Indexed { hival: u8, palette: Vec<u8> },
}

impl ColorSpaceDescriptor {
    /// Samples per pixel in the encoded payload.
    pub fn component_count(&self) -> u8 {
        match self {
            ColorSpaceDescriptor::DeviceGray => 1,
            ColorSpaceDescriptor::DeviceRgb => 3,
            ColorSpaceDescriptor::DeviceCmyk => 4,
            ColorSpaceDescriptor::Indexed { .. } => 1,
        }
    }

    /// Components of the underlying device space, which for an indexed
    /// payload is the palette target. This is the `N` of an attached ICC
    /// profile.
    pub fn base_components(&self) -> u8 {
        match self {
            ColorSpaceDescriptor::DeviceGray => 1,
            ColorSpaceDescriptor::DeviceRgb => 3,
            ColorSpaceDescriptor::DeviceCmyk => 4,
            ColorSpaceDescriptor::Indexed { .. } => 3,
        }
    }

    /// PDF name for device spaces. Indexed spaces serialize as an array
    /// with an embedded palette stream, which the writer composes from
    /// [`ColorSpaceDescriptor::Indexed`] itself.
    pub fn pdf_name(&self) -> Option<&'static str> {
        match self {
            ColorSpaceDescriptor::DeviceGray => Some("DeviceGray"),
            ColorSpaceDescriptor::DeviceRgb => Some("DeviceRGB"),
            ColorSpaceDescriptor::DeviceCmyk => Some("DeviceCMYK"),
            ColorSpaceDescriptor::Indexed { .. } => None,
        }
    }
}

/// One encoded image object, ready for the writer to serialize.
#[derive(Debug)]
pub struct ImageObjectDescriptor {
    id: ImageId,
    filter: Filter,
    color_space: ColorSpaceDescriptor,
    bits_per_component: u8,
    width: u32,
    height: u32,
    payload: Vec<u8>,
    decode_parms: Option<Dictionary>,
    decode: Option<Vec<f64>>,
    soft_mask: Option<Arc<ImageObjectDescriptor>>,
    icc: Option<(IccId, Arc<IccProfile>)>,
}

impl ImageObjectDescriptor {
    pub(crate) fn from_encoded(
        id: ImageId,
        encoded: EncodedImage,
        soft_mask: Option<Arc<ImageObjectDescriptor>>,
        icc: Option<(IccId, Arc<IccProfile>)>,
    ) -> Self {
        ImageObjectDescriptor {
            id,
            filter: encoded.filter,
            color_space: encoded.color_space,
            bits_per_component: encoded.bits_per_component,
            width: encoded.width,
            height: encoded.height,
            payload: encoded.payload,
            decode_parms: encoded.decode_parms,
            decode: encoded.decode,
            soft_mask,
            icc,
        }
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn color_space(&self) -> &ColorSpaceDescriptor {
        &self.color_space
    }

    pub fn bits_per_component(&self) -> u8 {
        self.bits_per_component
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The encoded stream bytes, embedded verbatim by the writer.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn decode_parms(&self) -> Option<&Dictionary> {
        self.decode_parms.as_ref()
    }

    pub fn decode(&self) -> Option<&[f64]> {
        self.decode.as_deref()
    }

    pub fn soft_mask(&self) -> Option<&Arc<ImageObjectDescriptor>> {
        self.soft_mask.as_ref()
    }

    pub fn icc_profile(&self) -> Option<(IccId, &Arc<IccProfile>)> {
        self.icc.as_ref().map(|(id, profile)| (*id, profile))
    }

    /// Assemble the XObject attribute dictionary. `SMask` and ICC-based
    /// color-space entries are indirect references, so the writer adds
    /// those from [`ImageObjectDescriptor::soft_mask`] and
    /// [`ImageObjectDescriptor::icc_profile`] once object numbers exist.
    pub fn attributes(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("XObject"));
        dict.set("Subtype", Object::name("Image"));
        dict.set("Width", self.width);
        dict.set("Height", self.height);
        dict.set("BitsPerComponent", i64::from(self.bits_per_component));
        dict.set("Filter", Object::name(self.filter.pdf_name()));
        if let Some(name) = self.color_space.pdf_name() {
            dict.set("ColorSpace", Object::name(name));
        }
        if let Some(parms) = &self.decode_parms {
            dict.set("DecodeParms", parms.clone());
        }
        if let Some(decode) = &self.decode {
            let values: Vec<Object> = decode.iter().map(|v| Object::Real(*v)).collect();
            dict.set("Decode", values);
        }
        dict
    }
}
