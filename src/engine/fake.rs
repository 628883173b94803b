//! Scriptable in-memory engine for tests.

use super::{
    DecoderConfig, ElementId, ElementTable, EngineError, RenderEvent, RenderedFrame,
    RenderingEngine, Viewport,
};
use crate::model::{DecodedImage, ImageId, ImageKind, Size};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};

/// Engine whose decode results are set up front, keyed by identifier text
/// (`wadouri:...` / `webImage:...`).
#[derive(Default)]
pub struct FakeEngine {
    responses: Mutex<HashMap<String, Result<DecodedImage, EngineError>>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    check_failures: Mutex<VecDeque<EngineError>>,
    check_calls: Mutex<usize>,
    loaders: Mutex<HashSet<ImageKind>>,
    decoder: Mutex<DecoderConfig>,
    decoder_history: Mutex<Vec<DecoderConfig>>,
    load_log: Mutex<Vec<String>>,
    purges: Mutex<usize>,
    elements: ElementTable,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every load of `id` with `response`.
    pub fn respond(&self, id: &str, response: Result<DecodedImage, EngineError>) {
        self.responses.lock().insert(id.to_string(), response);
    }

    /// Make loads of `id` wait until [`FakeEngine::release`] is called.
    pub fn hold(&self, id: &str) {
        self.gates
            .lock()
            .insert(id.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, id: &str) {
        if let Some(gate) = self.gates.lock().remove(id) {
            gate.close();
        }
    }

    /// Fail the next `count` dependency checks with `err`.
    pub fn fail_dependency_checks(&self, count: usize, err: EngineError) {
        let mut failures = self.check_failures.lock();
        failures.extend(std::iter::repeat(err).take(count));
    }

    pub fn check_calls(&self) -> usize {
        *self.check_calls.lock()
    }

    pub fn has_loader(&self, kind: ImageKind) -> bool {
        self.loaders.lock().contains(&kind)
    }

    pub fn load_calls(&self, id: &str) -> usize {
        self.load_log.lock().iter().filter(|entry| *entry == id).count()
    }

    pub fn load_log(&self) -> Vec<String> {
        self.load_log.lock().clone()
    }

    pub fn decoder_history(&self) -> Vec<DecoderConfig> {
        self.decoder_history.lock().clone()
    }

    pub fn purge_calls(&self) -> usize {
        *self.purges.lock()
    }

    pub fn enabled_count(&self) -> usize {
        self.elements.enabled_count()
    }

    pub fn displayed(&self, element: ElementId) -> Option<Arc<DecodedImage>> {
        self.elements.image(element)
    }

    pub fn canvas(&self, element: ElementId) -> Result<Size, EngineError> {
        self.elements.canvas(element)
    }
}

#[async_trait]
impl RenderingEngine for FakeEngine {
    fn check_dependencies(&self) -> Result<(), EngineError> {
        *self.check_calls.lock() += 1;
        match self.check_failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn register_image_loader(&self, kind: ImageKind) -> Result<(), EngineError> {
        self.loaders.lock().insert(kind);
        Ok(())
    }

    fn configure_decoder(&self, config: DecoderConfig) {
        *self.decoder.lock() = config;
        self.decoder_history.lock().push(config);
    }

    fn decoder_config(&self) -> DecoderConfig {
        *self.decoder.lock()
    }

    fn enable(&self, element: ElementId) -> Result<(), EngineError> {
        self.elements.enable(element)
    }

    fn disable(&self, element: ElementId) -> Result<(), EngineError> {
        self.elements.disable(element)
    }

    fn is_enabled(&self, element: ElementId) -> bool {
        self.elements.is_enabled(element)
    }

    async fn load_image(&self, id: &ImageId) -> Result<DecodedImage, EngineError> {
        let key = id.to_string();
        self.load_log.lock().push(key.clone());

        let gate = self.gates.lock().get(&key).cloned();
        if let Some(gate) = gate {
            // Closed on release; a closed semaphore fails the acquire.
            let _ = gate.acquire().await;
        }

        self.responses
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(EngineError::Fetch(format!("no fixture for {key}"))))
    }

    fn display_image(
        &self,
        element: ElementId,
        image: Arc<DecodedImage>,
    ) -> Result<(), EngineError> {
        self.elements.display(element, image)
    }

    fn resize(&self, element: ElementId, size: Size) -> Result<(), EngineError> {
        self.elements.resize(element, size)
    }

    fn viewport(&self, element: ElementId) -> Result<Viewport, EngineError> {
        self.elements.viewport(element)
    }

    fn set_viewport(&self, element: ElementId, viewport: Viewport) -> Result<(), EngineError> {
        self.elements.set_viewport(element, viewport)
    }

    fn default_viewport(&self, element: ElementId) -> Result<Viewport, EngineError> {
        self.elements.default_viewport(element)
    }

    fn render(&self, element: ElementId) -> Result<RenderedFrame, EngineError> {
        self.elements.render(element)
    }

    fn purge_cache(&self) {
        *self.purges.lock() += 1;
    }

    fn render_events(&self) -> broadcast::Receiver<RenderEvent> {
        self.elements.subscribe()
    }
}
