//! Part 10 files for decoder tests.

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use std::error::Error;
use std::path::Path;

/// Unsigned 16-bit MONOCHROME2 slice with a ramp of sample values.
#[derive(Debug, Clone)]
pub struct DicomFixture {
    rows: u16,
    columns: u16,
    modality: String,
    pixel_spacing: Option<String>,
    number_of_frames: Option<String>,
    window: Option<(String, String)>,
}

impl DicomFixture {
    pub fn ct(rows: u16, columns: u16) -> Self {
        Self {
            rows,
            columns,
            modality: "CT".to_string(),
            pixel_spacing: None,
            number_of_frames: None,
            window: None,
        }
    }

    /// Raw `row\column` value of (0028,0030).
    pub fn pixel_spacing(mut self, raw: &str) -> Self {
        self.pixel_spacing = Some(raw.to_string());
        self
    }

    /// Raw (0028,0008) value; the pixel data still holds one frame.
    pub fn number_of_frames(mut self, raw: &str) -> Self {
        self.number_of_frames = Some(raw.to_string());
        self
    }

    pub fn window(mut self, center: &str, width: &str) -> Self {
        self.window = Some((center.to_string(), width.to_string()));
        self
    }

    pub fn write(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        let mut object = InMemDicomObject::new_empty();
        let mut put = |tag, vr, value: PrimitiveValue| {
            object.put(DataElement::new(tag, vr, value));
        };

        put(tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE.into());
        put(tags::SOP_INSTANCE_UID, VR::UI, "1.2.826.0.1.3680043.2.1125.1".into());
        put(tags::MODALITY, VR::CS, self.modality.as_str().into());
        put(tags::SAMPLES_PER_PIXEL, VR::US, 1_u16.into());
        put(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2".into());
        put(tags::ROWS, VR::US, self.rows.into());
        put(tags::COLUMNS, VR::US, self.columns.into());
        put(tags::BITS_ALLOCATED, VR::US, 16_u16.into());
        put(tags::BITS_STORED, VR::US, 16_u16.into());
        put(tags::HIGH_BIT, VR::US, 15_u16.into());
        put(tags::PIXEL_REPRESENTATION, VR::US, 0_u16.into());
        if let Some(spacing) = &self.pixel_spacing {
            put(tags::PIXEL_SPACING, VR::DS, spacing.as_str().into());
        }
        if let Some(frames) = &self.number_of_frames {
            put(tags::NUMBER_OF_FRAMES, VR::IS, frames.as_str().into());
        }
        if let Some((center, width)) = &self.window {
            put(tags::WINDOW_CENTER, VR::DS, center.as_str().into());
            put(tags::WINDOW_WIDTH, VR::DS, width.as_str().into());
        }

        let count = usize::from(self.rows) * usize::from(self.columns);
        let samples: Vec<u16> = (0..count).map(|i| (i % 4096) as u16).collect();
        put(tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(samples.into()));

        let file = object.with_meta(
            FileMetaTableBuilder::new()
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1125.1")
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN),
        )?;
        file.write_to_file(path)?;
        Ok(())
    }
}
