pub mod image_viewer;
pub mod metadata_panel;
pub mod thumbnails;
pub mod toolbar;

pub use image_viewer::{viewport_panel, wheel_input};
pub use metadata_panel::metadata_panel;
pub use thumbnails::{thumbnail_strip, ThumbnailView};
pub use toolbar::{toolbar, ToolbarState};
