pub mod segmented_toggle;

pub use segmented_toggle::tool_toggle;
