use super::decoded::DecodedImage;
use dicom::dictionary_std::tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Physical size of one pixel in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSpacing {
    pub width: f64,
    pub height: f64,
}

/// Diagnostic fields shown next to a medical image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagnosticMetadata {
    pub modality: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub pixel_spacing: Option<PixelSpacing>,
}

/// Pull the diagnostic fields out of a decoded image.
///
/// Every field is read on its own: a missing or malformed tag leaves that
/// field empty and never affects the others.
pub fn extract(image: &DecodedImage) -> DiagnosticMetadata {
    DiagnosticMetadata {
        modality: guarded("modality", || modality(image)),
        dimensions: guarded("dimensions", || dimensions(image)),
        pixel_spacing: guarded("pixel spacing", || pixel_spacing(image)),
    }
}

fn guarded<T>(field: &str, read: impl FnOnce() -> Result<Option<T>, String>) -> Option<T> {
    match read() {
        Ok(value) => value,
        Err(err) => {
            log::warn!("Unable to read {field}: {err}");
            None
        }
    }
}

fn modality(image: &DecodedImage) -> Result<Option<String>, String> {
    Ok(image
        .attribute(tags::MODALITY)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

fn dimensions(image: &DecodedImage) -> Result<Option<Dimensions>, String> {
    if image.size().is_empty() {
        return Err(format!(
            "image reports {}x{} pixels",
            image.width(),
            image.height()
        ));
    }
    Ok(Some(Dimensions {
        width: image.width(),
        height: image.height(),
    }))
}

fn pixel_spacing(image: &DecodedImage) -> Result<Option<PixelSpacing>, String> {
    let Some(raw) = image.attribute(tags::PIXEL_SPACING) else {
        return Ok(None);
    };
    parse_pixel_spacing(raw).map(Some)
}

/// Parse a `row\column` spacing pair into width/height spacing.
pub fn parse_pixel_spacing(raw: &str) -> Result<PixelSpacing, String> {
    let mut parts = raw.split('\\').map(str::trim);
    let (Some(row), Some(column)) = (parts.next(), parts.next()) else {
        return Err(format!("expected `row\\column`, got `{raw}`"));
    };
    let row: f64 = row
        .parse()
        .map_err(|err| format!("row spacing `{row}`: {err}"))?;
    let column: f64 = column
        .parse()
        .map_err(|err| format!("column spacing `{column}`: {err}"))?;
    Ok(PixelSpacing {
        width: column,
        height: row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::decoded::{GraySamples, PixelData};
    use std::collections::BTreeMap;

    fn ct_image(spacing: Option<&str>) -> DecodedImage {
        let mut attributes = BTreeMap::new();
        attributes.insert(tags::MODALITY, "CT".to_string());
        if let Some(spacing) = spacing {
            attributes.insert(tags::PIXEL_SPACING, spacing.to_string());
        }
        DecodedImage::medical(
            512,
            512,
            PixelData::Gray(GraySamples::Narrow(vec![0; 512 * 512])),
            attributes,
        )
    }

    #[test]
    fn test_extracts_all_fields() {
        let metadata = extract(&ct_image(Some("0.5\\0.7")));
        assert_eq!(metadata.modality.as_deref(), Some("CT"));
        assert_eq!(
            metadata.dimensions,
            Some(Dimensions {
                width: 512,
                height: 512
            })
        );
        assert_eq!(
            metadata.pixel_spacing,
            Some(PixelSpacing {
                width: 0.7,
                height: 0.5
            })
        );
    }

    #[test]
    fn test_bad_spacing_leaves_other_fields() {
        let metadata = extract(&ct_image(Some("abc")));
        assert_eq!(metadata.pixel_spacing, None);
        assert_eq!(metadata.modality.as_deref(), Some("CT"));
        assert!(metadata.dimensions.is_some());
    }

    #[test]
    fn test_missing_tags_stay_empty() {
        let image = DecodedImage::medical(
            4,
            4,
            PixelData::Gray(GraySamples::Narrow(vec![0; 16])),
            BTreeMap::new(),
        );
        let metadata = extract(&image);
        assert_eq!(metadata.modality, None);
        assert_eq!(metadata.pixel_spacing, None);
    }

    #[test]
    fn test_parse_pixel_spacing_rejects_single_value() {
        assert!(parse_pixel_spacing("0.5").is_err());
        assert!(parse_pixel_spacing("0.5\\x").is_err());
        let spacing = parse_pixel_spacing(" 0.25 \\ 0.3 ").unwrap();
        assert_eq!(spacing.width, 0.3);
        assert_eq!(spacing.height, 0.25);
    }
}
