//! Rendering engine binding.
//!
//! [`RenderingEngine`] is the contract every backend satisfies: element
//! enable/disable, image decode, display, resize and viewport access.
//! [`EngineState`] owns the one-time initialization of the shared engine.

pub mod decode;
pub mod element;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod fetch;
#[cfg(any(test, feature = "testing"))]
pub mod fixtures;
pub mod software;
pub mod state;

use crate::model::{DecodedImage, ImageId, ImageKind, Size, Voi};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub use element::ElementTable;
#[cfg(any(test, feature = "testing"))]
pub use fake::FakeEngine;
pub use software::SoftwareEngine;
pub use state::{EngineState, InitStatus, RetryPolicy};

/// Opaque handle for a host container the engine can draw into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "element-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Translation {
    pub x: f64,
    pub y: f64,
}

/// Display transform of an enabled element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scale: f64,
    /// Offset in image pixels.
    pub translation: Translation,
    /// Clockwise rotation in degrees.
    pub rotation: f64,
    pub voi: Option<Voi>,
    pub invert: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translation: Translation::default(),
            rotation: 0.0,
            voi: None,
            invert: false,
        }
    }
}

/// Emitted after the engine redraws an element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderEvent {
    pub element: ElementId,
    pub viewport: Viewport,
}

/// RGBA pixels of an element's canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Decode settings shared by every load on an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Decode on the blocking pool instead of inline.
    pub use_worker_threads: bool,
    /// Keep full-depth grayscale samples instead of 8-bit ones.
    pub high_bit_depth: bool,
    /// Budget for fetched bytes kept by the engine.
    pub cache_size_bytes: usize,
    /// Drop fetched bytes once they decoded successfully.
    pub discard_raw_after_decode: bool,
    /// Largest sample buffer a single decode may allocate.
    pub max_decode_bytes: usize,
}

impl DecoderConfig {
    pub fn conservative() -> Self {
        Self {
            use_worker_threads: false,
            high_bit_depth: true,
            cache_size_bytes: 64 * 1024 * 1024,
            discard_raw_after_decode: true,
            max_decode_bytes: 256 * 1024 * 1024,
        }
    }

    /// Settings used after a decode ran out of memory.
    pub fn reduced_fidelity(self) -> Self {
        Self {
            use_worker_threads: false,
            high_bit_depth: false,
            cache_size_bytes: 16 * 1024 * 1024,
            ..self
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::conservative()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("environment cannot host the viewer: {0}")]
    Environment(String),

    #[error("engine dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("{0} is already enabled")]
    AlreadyEnabled(ElementId),

    #[error("{0} is not enabled")]
    NotEnabled(ElementId),

    #[error("{0} has no image displayed")]
    NoImage(ElementId),

    #[error("no image loader registered for `{0}`")]
    NoLoader(&'static str),

    #[error("unrecognized image format: {0}")]
    Format(String),

    #[error("image too large to decode: {0}")]
    Memory(String),

    #[error("pixel data could not be decoded: {0}")]
    Decode(String),

    #[error("{0}")]
    Fetch(String),
}

impl EngineError {
    pub fn is_memory(&self) -> bool {
        matches!(self, EngineError::Memory(_))
    }

    pub fn is_format(&self) -> bool {
        matches!(self, EngineError::Format(_))
    }
}

#[async_trait]
pub trait RenderingEngine: Send + Sync {
    /// Check that every decoder and the runtime the engine needs are present.
    fn check_dependencies(&self) -> Result<(), EngineError>;

    fn register_image_loader(&self, kind: ImageKind) -> Result<(), EngineError>;

    fn configure_decoder(&self, config: DecoderConfig);

    fn decoder_config(&self) -> DecoderConfig;

    fn enable(&self, element: ElementId) -> Result<(), EngineError>;

    fn disable(&self, element: ElementId) -> Result<(), EngineError>;

    fn is_enabled(&self, element: ElementId) -> bool;

    async fn load_image(&self, id: &ImageId) -> Result<DecodedImage, EngineError>;

    fn display_image(
        &self,
        element: ElementId,
        image: Arc<DecodedImage>,
    ) -> Result<(), EngineError>;

    fn resize(&self, element: ElementId, size: Size) -> Result<(), EngineError>;

    fn viewport(&self, element: ElementId) -> Result<Viewport, EngineError>;

    fn set_viewport(&self, element: ElementId, viewport: Viewport) -> Result<(), EngineError>;

    /// Fit-to-canvas viewport for the image currently on the element.
    fn default_viewport(&self, element: ElementId) -> Result<Viewport, EngineError>;

    fn render(&self, element: ElementId) -> Result<RenderedFrame, EngineError>;

    fn purge_cache(&self);

    fn render_events(&self) -> broadcast::Receiver<RenderEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_ids_are_unique() {
        let a = ElementId::next();
        let b = ElementId::next();
        assert_ne!(a, b);
        assert_eq!(ElementId::from_raw(a.raw()), a);
    }

    #[test]
    fn test_reduced_fidelity_drops_depth_and_cache() {
        let reduced = DecoderConfig::conservative().reduced_fidelity();
        assert!(!reduced.high_bit_depth);
        assert!(!reduced.use_worker_threads);
        assert!(reduced.cache_size_bytes < DecoderConfig::conservative().cache_size_bytes);
        assert_eq!(
            reduced.max_decode_bytes,
            DecoderConfig::conservative().max_decode_bytes
        );
    }
}
