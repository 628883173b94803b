pub mod decoded;
pub mod image_id;
pub mod metadata;

pub use decoded::{DecodedImage, GraySamples, PixelData, Size, Voi};
pub use image_id::{ImageId, ImageKind};
pub use metadata::{extract, DiagnosticMetadata, Dimensions, PixelSpacing};
