use crate::model::{Dimensions, PixelSpacing};
use dicom::core::value::{PrimitiveValue, Value};
use dicom::core::{Tag, VR};

const MAX_VALUE_LEN: usize = 120;

/// Display text for one attribute of a decoded medical image, clipped for
/// the metadata table.
pub fn value_to_string<I, P>(value: &Value<I, P>, vr: VR) -> String {
    let text = match value {
        Value::Primitive(primitive) => primitive_text(primitive, vr),
        Value::Sequence(sequence) => {
            format!("Sequence of {}", counted(sequence.multiplicity() as usize, "item"))
        }
        Value::PixelSequence(sequence) => match sequence.offset_table().len() {
            0 => format!(
                "Encapsulated pixels, {}",
                counted(sequence.fragments().len(), "fragment")
            ),
            offsets => format!(
                "Encapsulated pixels, {} / {}",
                counted(sequence.fragments().len(), "fragment"),
                counted(offsets, "offset")
            ),
        },
    };
    clip(text)
}

pub fn format_tag(tag: Tag) -> String {
    format!("{:04X},{:04X}", tag.group(), tag.element())
}

pub fn format_zoom(percent: Option<u32>) -> String {
    percent.map_or_else(|| "Zoom: --".to_string(), |percent| format!("Zoom: {percent}%"))
}

pub fn format_dimensions(dimensions: Dimensions) -> String {
    format!("{} × {} px", dimensions.width, dimensions.height)
}

/// Column spacing first, matching the width/height order of the dimensions.
pub fn format_spacing(spacing: PixelSpacing) -> String {
    format!("{:.2} × {:.2} mm", spacing.width, spacing.height)
}

fn primitive_text(value: &PrimitiveValue, vr: VR) -> String {
    match value {
        PrimitiveValue::Empty => "(empty)".to_string(),
        PrimitiveValue::Tags(tags) => tags
            .iter()
            .copied()
            .map(format_tag)
            .collect::<Vec<_>>()
            .join("\\"),
        PrimitiveValue::U8(_) if carries_bulk_data(vr) => {
            format!("{} of binary data", counted(value.calculate_byte_len(), "byte"))
        }
        other => other.to_str().into_owned(),
    }
}

fn carries_bulk_data(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN
    )
}

fn counted(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

fn clip(text: String) -> String {
    match text.char_indices().nth(MAX_VALUE_LEN) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text,
    }
}
