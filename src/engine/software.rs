use super::decode::{decode_medical, decode_raster};
use super::fetch::fetch_bytes;
use super::{
    DecoderConfig, ElementId, ElementTable, EngineError, RenderEvent, RenderedFrame,
    RenderingEngine, Viewport,
};
use crate::model::image_id::split_downsample_hint;
use crate::model::{DecodedImage, ImageId, ImageKind, Size};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Fetched bytes keyed by URL, oldest evicted first once over budget.
#[derive(Default)]
struct RawCache {
    entries: HashMap<String, Arc<Vec<u8>>>,
    order: VecDeque<String>,
    total: usize,
}

impl RawCache {
    fn get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.entries.get(url).cloned()
    }

    fn insert(&mut self, url: String, bytes: Arc<Vec<u8>>, budget: usize) {
        if bytes.len() > budget {
            return;
        }
        self.remove(&url);
        self.total += bytes.len();
        self.order.push_back(url.clone());
        self.entries.insert(url, bytes);
        while self.total > budget {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.total -= evicted.len();
            }
        }
    }

    fn remove(&mut self, url: &str) {
        if let Some(bytes) = self.entries.remove(url) {
            self.total -= bytes.len();
            self.order.retain(|entry| entry != url);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total = 0;
    }
}

/// CPU rendering backend: DICOM through `dicom`, web images through `image`.
pub struct SoftwareEngine {
    client: reqwest::Client,
    loaders: Mutex<HashSet<ImageKind>>,
    decoder: Mutex<DecoderConfig>,
    raw: Mutex<RawCache>,
    elements: ElementTable,
}

impl Default for SoftwareEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareEngine {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            loaders: Mutex::new(HashSet::new()),
            decoder: Mutex::new(DecoderConfig::conservative()),
            raw: Mutex::new(RawCache::default()),
            elements: ElementTable::new(),
        }
    }

    pub fn raw_cache_bytes(&self) -> usize {
        self.raw.lock().total
    }

    async fn bytes_for(&self, url: &str, config: &DecoderConfig) -> Result<Arc<Vec<u8>>, EngineError> {
        if let Some(bytes) = self.raw.lock().get(url) {
            log::debug!("Raw cache hit for {url}");
            return Ok(bytes);
        }
        let bytes = Arc::new(fetch_bytes(&self.client, url).await?);
        self.raw
            .lock()
            .insert(url.to_string(), Arc::clone(&bytes), config.cache_size_bytes);
        Ok(bytes)
    }
}

fn decode(
    kind: ImageKind,
    bytes: &[u8],
    config: &DecoderConfig,
    downsample: u32,
) -> Result<DecodedImage, EngineError> {
    match kind {
        ImageKind::Medical => decode_medical(bytes, config, downsample),
        ImageKind::Raster => decode_raster(bytes, config, downsample),
    }
}

#[async_trait]
impl RenderingEngine for SoftwareEngine {
    fn check_dependencies(&self) -> Result<(), EngineError> {
        tokio::runtime::Handle::try_current()
            .map(|_| ())
            .map_err(|err| EngineError::Environment(format!("no async runtime: {err}")))
    }

    fn register_image_loader(&self, kind: ImageKind) -> Result<(), EngineError> {
        if self.loaders.lock().insert(kind) {
            log::debug!("Registered `{}` image loader", kind.prefix());
        }
        Ok(())
    }

    fn configure_decoder(&self, config: DecoderConfig) {
        log::info!("Decoder configured: {config:?}");
        *self.decoder.lock() = config;
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
        if !self.loaders.lock().contains(&id.kind()) {
            return Err(EngineError::NoLoader(id.kind().prefix()));
        }
        let config = self.decoder_config();
        let (url, downsample) = split_downsample_hint(id.url());
        let bytes = self.bytes_for(url, &config).await?;

        log::info!("Decoding {id} ({} bytes)", bytes.len());
        let kind = id.kind();
        let image = if config.use_worker_threads {
            tokio::task::spawn_blocking(move || decode(kind, &bytes, &config, downsample))
                .await
                .map_err(|err| EngineError::Decode(format!("decode task failed: {err}")))?
        } else {
            decode(kind, &bytes, &config, downsample)
        }?;

        // Failed decodes keep their bytes for the loader's fallback attempts.
        if config.discard_raw_after_decode {
            self.raw.lock().remove(url);
        }
        Ok(image)
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
        self.raw.lock().clear();
    }

    fn render_events(&self) -> broadcast::Receiver<RenderEvent> {
        self.elements.subscribe()
    }
}
