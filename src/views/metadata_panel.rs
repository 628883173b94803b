use crate::message::Message;
use crate::model::{DecodedImage, DiagnosticMetadata};
use crate::utils::{format_dimensions, format_spacing, format_tag};
use dicom::core::dictionary::DataDictionary;
use dicom::dictionary_std::StandardDataDictionary;
use iced::widget::text::Wrapping;
use iced::widget::{column, row, scrollable, text};
use iced::{Element, Length};

pub fn metadata_panel<'a>(
    metadata: Option<&'a DiagnosticMetadata>,
    image: Option<&'a DecodedImage>,
) -> Element<'a, Message> {
    let Some(metadata) = metadata else {
        return match image {
            Some(_) => text("No diagnostic metadata for plain images").into(),
            None => text("Open an image to view its metadata").into(),
        };
    };

    let unknown = || "Unknown".to_string();
    let summary = column![
        summary_row("Modality", metadata.modality.clone().unwrap_or_else(unknown)),
        summary_row(
            "Dimensions",
            metadata
                .dimensions
                .map(format_dimensions)
                .unwrap_or_else(unknown)
        ),
        summary_row(
            "Pixel spacing",
            metadata
                .pixel_spacing
                .map(format_spacing)
                .unwrap_or_else(unknown)
        ),
    ]
    .spacing(6);

    let mut table = column![row![
        text("Tag").width(Length::FillPortion(1)),
        text("Alias").width(Length::FillPortion(2)),
        text("Value").width(Length::FillPortion(4)),
    ]
    .spacing(12)];

    if let Some(attributes) = image.and_then(DecodedImage::attributes) {
        for (tag, value) in attributes {
            let alias = StandardDataDictionary
                .by_tag(*tag)
                .map(|entry| entry.alias)
                .unwrap_or("Unknown");
            table = table.push(
                row![
                    text(format_tag(*tag)).width(Length::FillPortion(1)),
                    text(alias).width(Length::FillPortion(2)),
                    text(value)
                        .width(Length::FillPortion(4))
                        .wrapping(Wrapping::Word),
                ]
                .spacing(12),
            );
        }
    }

    column![
        text("Diagnostic metadata").size(18),
        summary,
        scrollable(table.spacing(8)),
    ]
    .spacing(12)
    .into()
}

fn summary_row(label: &'static str, value: String) -> Element<'static, Message> {
    row![
        text(label).width(Length::FillPortion(1)),
        text(value).width(Length::FillPortion(2)),
    ]
    .spacing(12)
    .into()
}
