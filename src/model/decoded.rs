use super::image_id::ImageKind;
use dicom::core::Tag;
use std::collections::BTreeMap;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Window center/width applied to grayscale samples before display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voi {
    pub window_center: f64,
    pub window_width: f64,
}

impl Voi {
    pub fn new(window_center: f64, window_width: f64) -> Self {
        Self {
            window_center,
            window_width,
        }
    }

    /// Window spanning the full sample range.
    pub fn from_range(min: f64, max: f64) -> Self {
        let width = (max - min).max(1.0);
        Self::new(min + width / 2.0, width)
    }

    /// Linear VOI function mapping a modality value to an 8-bit level.
    pub fn apply(&self, value: f64) -> u8 {
        let center = self.window_center - 0.5;
        let width = (self.window_width - 1.0).max(1.0);
        let half = width / 2.0;
        if value <= center - half {
            0
        } else if value > center + half {
            255
        } else {
            (((value - center) / width + 0.5) * 255.0)
                .clamp(0.0, 255.0)
                .round() as u8
        }
    }
}

/// Grayscale samples at the fidelity the decoder was configured for.
#[derive(Debug, Clone, PartialEq)]
pub enum GraySamples {
    /// Modality values (rescale applied), full bit depth.
    Wide(Vec<i32>),
    /// Values already normalized to 8 bits.
    Narrow(Vec<u8>),
}

impl GraySamples {
    pub fn len(&self) -> usize {
        match self {
            GraySamples::Wide(samples) => samples.len(),
            GraySamples::Narrow(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self, index: usize) -> Option<f64> {
        match self {
            GraySamples::Wide(samples) => samples.get(index).map(|v| f64::from(*v)),
            GraySamples::Narrow(samples) => samples.get(index).map(|v| f64::from(*v)),
        }
    }

    pub fn min_max(&self) -> Option<(f64, f64)> {
        let fold = |acc: Option<(f64, f64)>, value: f64| match acc {
            None => Some((value, value)),
            Some((min, max)) => Some((min.min(value), max.max(value))),
        };
        match self {
            GraySamples::Wide(samples) => samples.iter().map(|v| f64::from(*v)).fold(None, fold),
            GraySamples::Narrow(samples) => samples.iter().map(|v| f64::from(*v)).fold(None, fold),
        }
    }

    fn byte_len(&self) -> usize {
        match self {
            GraySamples::Wide(samples) => samples.len() * std::mem::size_of::<i32>(),
            GraySamples::Narrow(samples) => samples.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Gray(GraySamples),
    Rgba(Vec<u8>),
}

/// Decoded pixels plus the tag values needed to describe them.
///
/// Created once by the engine and shared behind an `Arc`; there are no
/// mutating methods.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    kind: ImageKind,
    size: Size,
    pixels: PixelData,
    default_voi: Option<Voi>,
    invert: bool,
    attributes: Option<BTreeMap<Tag, String>>,
}

impl DecodedImage {
    pub fn raster(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            kind: ImageKind::Raster,
            size: Size::new(width, height),
            pixels: PixelData::Rgba(rgba),
            default_voi: None,
            invert: false,
            attributes: None,
        }
    }

    pub fn medical(
        width: u32,
        height: u32,
        pixels: PixelData,
        attributes: BTreeMap<Tag, String>,
    ) -> Self {
        let default_voi = match &pixels {
            PixelData::Gray(samples) => samples
                .min_max()
                .map(|(min, max)| Voi::from_range(min, max)),
            PixelData::Rgba(_) => None,
        };
        Self {
            kind: ImageKind::Medical,
            size: Size::new(width, height),
            pixels,
            default_voi,
            invert: false,
            attributes: Some(attributes),
        }
    }

    pub fn with_voi(mut self, voi: Voi) -> Self {
        self.default_voi = Some(voi);
        self
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn is_medical(&self) -> bool {
        self.kind == ImageKind::Medical
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn pixels(&self) -> &PixelData {
        &self.pixels
    }

    pub fn default_voi(&self) -> Option<Voi> {
        self.default_voi
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    /// Raw string value of a tag, for medical images only.
    pub fn attribute(&self, tag: Tag) -> Option<&str> {
        self.attributes
            .as_ref()
            .and_then(|attributes| attributes.get(&tag))
            .map(String::as_str)
    }

    pub fn attributes(&self) -> Option<&BTreeMap<Tag, String>> {
        self.attributes.as_ref()
    }

    pub fn byte_len(&self) -> usize {
        match &self.pixels {
            PixelData::Gray(samples) => samples.byte_len(),
            PixelData::Rgba(rgba) => rgba.len(),
        }
    }
}
