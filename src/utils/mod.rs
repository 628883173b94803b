pub mod formatting;

pub use formatting::{format_dimensions, format_spacing, format_tag, format_zoom, value_to_string};
