//! Shared image loader.
//!
//! [`ImageLoader`] sits between every viewport and the rendering engine. It
//! serves decoded images from a time-limited cache, folds concurrent
//! requests for one identifier into a single decode, and walks the decode
//! fallbacks (reduced fidelity, then plain raster) before giving up.

pub mod abort;
pub mod cache;

pub use abort::{AbortController, AbortSignal};
pub use cache::DecodedCache;

use crate::engine::RenderingEngine;
use crate::error::ViewerError;
use crate::model::{DecodedImage, ImageId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Settled = Option<Result<Arc<DecodedImage>, ViewerError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// How long a decoded image is served after it was stored.
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

pub struct ImageLoader {
    engine: Arc<dyn RenderingEngine>,
    config: LoaderConfig,
    cache: Mutex<DecodedCache>,
    in_flight: Mutex<HashMap<ImageId, watch::Receiver<Settled>>>,
}

/// Removes an in-flight entry however its decode task ends.
struct InFlightGuard<'a> {
    loader: &'a ImageLoader,
    id: &'a ImageId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.loader.in_flight.lock().remove(self.id);
    }
}

impl ImageLoader {
    pub fn new(engine: Arc<dyn RenderingEngine>, config: LoaderConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            config,
            cache: Mutex::new(DecodedCache::new(config.ttl)),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> LoaderConfig {
        self.config
    }

    /// Load `id`, resolving with [`ViewerError::Aborted`] as soon as `signal`
    /// fires. Aborting only detaches this caller; the decode keeps running
    /// for anyone else waiting on it and still fills the cache.
    pub async fn load(
        self: &Arc<Self>,
        id: &ImageId,
        signal: &AbortSignal,
    ) -> Result<Arc<DecodedImage>, ViewerError> {
        if signal.is_aborted() {
            return Err(ViewerError::Aborted);
        }

        if let Some(image) = self.cache.lock().get(id, Instant::now()) {
            log::debug!("Cache hit for {id}");
            return Ok(image);
        }

        let attempt = self.attempt(id);
        tokio::select! {
            biased;
            _ = signal.aborted() => {
                log::debug!("Load of {id} aborted by caller");
                Err(ViewerError::Aborted)
            }
            result = settled(attempt) => result,
        }
    }

    /// Drop every cached image here and in the engine.
    pub fn purge(&self) {
        let dropped = {
            let mut cache = self.cache.lock();
            let dropped = cache.len();
            cache.clear();
            dropped
        };
        self.engine.purge_cache();
        log::info!("Purged {dropped} cached images");
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Periodically evict expired entries. The task stops once the loader
    /// is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let loader = Arc::downgrade(self);
        let period = self.config.sweep_interval;
        tokio::spawn(sweep_loop(loader, period))
    }

    fn attempt(self: &Arc<Self>, id: &ImageId) -> watch::Receiver<Settled> {
        let mut in_flight = self.in_flight.lock();
        if let Some(pending) = in_flight.get(id) {
            log::debug!("Joining in-flight load of {id}");
            return pending.clone();
        }

        let (settle, pending) = watch::channel(None);
        in_flight.insert(id.clone(), pending.clone());
        drop(in_flight);

        let loader = Arc::clone(self);
        let id = id.clone();
        tokio::spawn(async move {
            let _guard = InFlightGuard {
                loader: &loader,
                id: &id,
            };
            let result = loader.decode_with_fallback(&id).await;
            if let Ok(image) = &result {
                loader
                    .cache
                    .lock()
                    .insert(id.clone(), Arc::clone(image), Instant::now());
            }
            settle.send_replace(Some(result));
        });
        pending
    }

    async fn decode_with_fallback(&self, id: &ImageId) -> Result<Arc<DecodedImage>, ViewerError> {
        log::info!("Decoding {id}");
        let original = match self.engine.load_image(id).await {
            Ok(image) => return Ok(Arc::new(image)),
            Err(err) => err,
        };

        let mut try_raster = original.is_format() && id.is_medical();

        if original.is_memory() {
            // Applies to every later load on this engine, not just this one.
            let reduced = self.engine.decoder_config().reduced_fidelity();
            self.engine.configure_decoder(reduced);
            let downsampled = id.with_downsample_hint();
            log::warn!("{id} exhausted decode memory ({original}), retrying as {downsampled}");
            match self.engine.load_image(&downsampled).await {
                Ok(image) => return Ok(Arc::new(image)),
                Err(err) => {
                    log::warn!("Downsampled retry of {id} failed: {err}");
                    try_raster = id.is_medical();
                }
            }
        }

        if try_raster {
            let raster = id.as_raster();
            log::warn!("{id} failed ({original}), retrying as {raster}");
            match self.engine.load_image(&raster).await {
                Ok(image) => return Ok(Arc::new(image)),
                Err(err) => log::warn!("Raster retry of {id} failed: {err}"),
            }
        }

        log::error!("Unable to load {id}: {original}");
        Err(original.into())
    }
}

async fn settled(
    mut pending: watch::Receiver<Settled>,
) -> Result<Arc<DecodedImage>, ViewerError> {
    loop {
        let current = pending.borrow_and_update().clone();
        if let Some(result) = current {
            return result;
        }
        if pending.changed().await.is_err() {
            let last = pending.borrow().clone();
            return last.unwrap_or_else(|| {
                Err(ViewerError::Engine(
                    "image load ended without a result".to_string(),
                ))
            });
        }
    }
}

async fn sweep_loop(loader: Weak<ImageLoader>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(loader) = loader.upgrade() else {
            break;
        };
        let removed = loader.cache.lock().sweep(Instant::now());
        if removed > 0 {
            log::debug!("Swept {removed} expired images");
        }
    }
}
