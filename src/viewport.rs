//! Per-viewport lifecycle.
//!
//! A [`ViewportController`] owns one engine element and walks it through
//! `Idle → Initializing → Loading → Displayed` (or `Errored`) each time the
//! host hands it a new URL. Every load gets its own abort handle and
//! generation number; a load that is no longer current never touches the
//! element or calls the observer.

use crate::config::ViewerConfig;
use crate::engine::{ElementId, EngineError, EngineState, RenderedFrame, RenderingEngine};
use crate::error::ViewerError;
use crate::input::InputArbiter;
use crate::loader::{AbortController, AbortSignal, ImageLoader};
use crate::model::{extract, DecodedImage, DiagnosticMetadata, ImageId, Size};
use crate::tools::{ButtonMask, Cursor, ToolName, ToolRegistry};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Services shared by every viewport in the process.
#[derive(Clone)]
pub struct ViewerContext {
    pub engine: Arc<EngineState>,
    pub loader: Arc<ImageLoader>,
    pub tools: Arc<ToolRegistry>,
    pub settle_delay: Duration,
}

impl ViewerContext {
    pub fn new(engine: Arc<dyn RenderingEngine>, config: &ViewerConfig) -> Self {
        let state = EngineState::new(Arc::clone(&engine), config.retry_policy())
            .with_decoder(config.decoder);
        Self {
            engine: Arc::new(state),
            loader: ImageLoader::new(Arc::clone(&engine), config.loader_config()),
            tools: Arc::new(ToolRegistry::new(engine, config.zoom)),
            settle_delay: config.layout_settle_delay(),
        }
    }

    pub fn rendering_engine(&self) -> &Arc<dyn RenderingEngine> {
        self.engine.engine()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewportId(u64);

impl ViewportId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ViewportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewport-{}", self.0)
    }
}

/// Host callbacks. Cancelled loads never reach them.
pub trait ViewportObserver: Send + Sync {
    fn on_metadata(&self, _viewport: ViewportId, _metadata: &DiagnosticMetadata) {}

    fn on_ready(&self, _viewport: ViewportId) {}

    fn on_error(&self, _viewport: ViewportId, _error: &ViewerError) {}
}

pub struct NoopObserver;

impl ViewportObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Initializing,
    Loading,
    Displayed,
    Errored,
    Unmounted,
}

/// Which overlay the host should draw.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayState {
    Placeholder,
    Loading,
    Failed(String),
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSnapshot {
    pub phase: Phase,
    pub url: Option<String>,
    pub metadata: Option<DiagnosticMetadata>,
    pub container: Option<Size>,
    pub error: Option<ViewerError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Displayed(Option<DiagnosticMetadata>),
    Failed(ViewerError),
    Cancelled,
}

struct ViewportState {
    phase: Phase,
    url: Option<String>,
    enabled: bool,
    abort: Option<AbortController>,
    generation: u64,
    image: Option<Arc<DecodedImage>>,
    metadata: Option<DiagnosticMetadata>,
    container: Option<Size>,
    error: Option<ViewerError>,
}

impl ViewportState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            url: None,
            enabled: false,
            abort: None,
            generation: 0,
            image: None,
            metadata: None,
            container: None,
            error: None,
        }
    }

    fn cancel(&mut self) {
        if let Some(previous) = self.abort.take() {
            previous.abort();
        }
        self.generation += 1;
    }
}

pub struct ViewportController {
    id: ViewportId,
    element: ElementId,
    context: ViewerContext,
    observer: Arc<dyn ViewportObserver>,
    state: Arc<Mutex<ViewportState>>,
}

impl ViewportController {
    pub fn new(
        element: ElementId,
        context: ViewerContext,
        observer: Arc<dyn ViewportObserver>,
    ) -> Self {
        let id = ViewportId::next();
        log::debug!("{id}: mounted on {element}");
        Self {
            id,
            element,
            context,
            observer,
            state: Arc::new(Mutex::new(ViewportState::new())),
        }
    }

    pub fn id(&self) -> ViewportId {
        self.id
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    /// Point the viewport at `url`.
    ///
    /// Returns the future that drives the load, or `None` when nothing needs
    /// to run: the URL is already loading or shown, the URL is empty (the
    /// viewport falls back to its placeholder), or the viewport is unmounted.
    /// Any earlier load of this viewport is cancelled first.
    pub fn load(
        &self,
        url: Option<&str>,
    ) -> Option<impl Future<Output = LoadOutcome> + Send + 'static> {
        let mut state = self.state.lock();
        if state.phase == Phase::Unmounted {
            log::debug!("{}: ignoring load after unmount", self.id);
            return None;
        }

        let Some(url) = url.map(str::trim).filter(|url| !url.is_empty()) else {
            state.cancel();
            state.phase = Phase::Idle;
            state.url = None;
            state.image = None;
            state.metadata = None;
            state.error = None;
            return None;
        };

        let busy_or_shown = matches!(
            state.phase,
            Phase::Initializing | Phase::Loading | Phase::Displayed
        );
        if busy_or_shown && state.url.as_deref() == Some(url) {
            log::debug!("{}: {url} already current, skipping", self.id);
            return None;
        }

        state.cancel();
        let controller = AbortController::new();
        let signal = controller.signal();
        state.abort = Some(controller);
        state.phase = Phase::Initializing;
        state.url = Some(url.to_string());
        state.image = None;
        state.metadata = None;
        state.error = None;

        let task = LoadTask {
            viewport: self.id,
            element: self.element,
            generation: state.generation,
            url: url.to_string(),
            signal,
            context: self.context.clone(),
            observer: Arc::clone(&self.observer),
            state: Arc::clone(&self.state),
        };
        Some(task.run())
    }

    /// Cancel any load, release the element and drop the image. Safe to call
    /// more than once.
    pub fn unmount(&self) {
        let was_enabled = {
            let mut state = self.state.lock();
            if state.phase == Phase::Unmounted {
                return;
            }
            state.cancel();
            state.phase = Phase::Unmounted;
            state.url = None;
            state.image = None;
            state.metadata = None;
            state.container = None;
            state.error = None;
            std::mem::take(&mut state.enabled)
        };

        if was_enabled {
            if let Err(err) = self.context.rendering_engine().disable(self.element) {
                log::warn!("{}: disabling {} failed: {err}", self.id, self.element);
            }
        }
        self.context.tools.forget(self.element);
        log::debug!("{}: unmounted", self.id);
    }

    pub fn snapshot(&self) -> ViewportSnapshot {
        let state = self.state.lock();
        ViewportSnapshot {
            phase: state.phase,
            url: state.url.clone(),
            metadata: state.metadata.clone(),
            container: state.container,
            error: state.error.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn display_state(&self) -> DisplayState {
        let state = self.state.lock();
        match state.phase {
            Phase::Idle | Phase::Unmounted => DisplayState::Placeholder,
            Phase::Initializing | Phase::Loading => DisplayState::Loading,
            Phase::Errored => DisplayState::Failed(
                state
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
            Phase::Displayed => DisplayState::Ready,
        }
    }

    pub fn image(&self) -> Option<Arc<DecodedImage>> {
        self.state.lock().image.clone()
    }

    pub fn activate_tool(&self, tool: ToolName) -> Result<(), ViewerError> {
        self.context
            .tools
            .activate(self.element, tool, ButtonMask::PRIMARY)
            .map_err(|err| {
                log::warn!("{}: {err}", self.id);
                ViewerError::from(err)
            })
    }

    pub fn active_tool(&self) -> Option<ToolName> {
        self.context.tools.active_tool(self.element)
    }

    pub fn cursor(&self) -> Cursor {
        self.context.tools.cursor(self.element)
    }

    pub fn reset_view(&self) -> Result<(), ViewerError> {
        self.context.tools.reset(self.element).map_err(ViewerError::from)
    }

    pub fn input_arbiter(&self) -> InputArbiter {
        InputArbiter::new(
            self.element,
            Arc::clone(self.context.rendering_engine()),
            Arc::clone(&self.context.tools),
        )
    }

    /// Current frame, once an image is displayed.
    pub fn render(&self) -> Option<RenderedFrame> {
        if self.phase() != Phase::Displayed {
            return None;
        }
        match self.context.rendering_engine().render(self.element) {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::warn!("{}: render failed: {err}", self.id);
                None
            }
        }
    }
}

impl Drop for ViewportController {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Everything one load needs, detached from the controller so the future is
/// `'static`.
struct LoadTask {
    viewport: ViewportId,
    element: ElementId,
    generation: u64,
    url: String,
    signal: AbortSignal,
    context: ViewerContext,
    observer: Arc<dyn ViewportObserver>,
    state: Arc<Mutex<ViewportState>>,
}

impl LoadTask {
    async fn run(self) -> LoadOutcome {
        let ready = tokio::select! {
            biased;
            _ = self.signal.aborted() => return LoadOutcome::Cancelled,
            ready = self.context.engine.initialize() => ready,
        };
        if !ready {
            return self.fail(ViewerError::Initialization(
                "rendering engine is unavailable".to_string(),
            ));
        }

        if let Err(outcome) = self.begin_loading() {
            return outcome;
        }

        let id = ImageId::from_url(&self.url);
        log::info!("{}: loading {id}", self.viewport);
        let image = match self.context.loader.load(&id, &self.signal).await {
            Ok(image) => image,
            Err(err) if err.is_aborted() => {
                log::debug!("{}: load of {id} cancelled", self.viewport);
                return LoadOutcome::Cancelled;
            }
            Err(err) => return self.fail(err),
        };

        let metadata = match self.commit(&image) {
            Ok(metadata) => metadata,
            Err(outcome) => return outcome,
        };
        if let Some(metadata) = &metadata {
            self.observer.on_metadata(self.viewport, metadata);
        }
        self.observer.on_ready(self.viewport);

        tokio::time::sleep(self.context.settle_delay).await;
        self.settle_resize(image.size());
        LoadOutcome::Displayed(metadata)
    }

    fn is_current(&self, state: &ViewportState) -> bool {
        state.generation == self.generation && !self.signal.is_aborted()
    }

    fn begin_loading(&self) -> Result<(), LoadOutcome> {
        let outcome = {
            let mut state = self.state.lock();
            if !self.is_current(&state) {
                return Err(LoadOutcome::Cancelled);
            }
            let engine = self.context.rendering_engine();
            let enabled = if state.enabled {
                Ok(())
            } else {
                match engine.enable(self.element) {
                    Ok(()) | Err(EngineError::AlreadyEnabled(_)) => {
                        state.enabled = true;
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            };
            if enabled.is_ok() {
                state.phase = Phase::Loading;
            }
            enabled
        };
        outcome.map_err(|err| self.fail(err.into()))
    }

    /// Show the image and bind tools, if this load is still the current one.
    fn commit(&self, image: &Arc<DecodedImage>) -> Result<Option<DiagnosticMetadata>, LoadOutcome> {
        let engine = self.context.rendering_engine();
        let shown = {
            let mut state = self.state.lock();
            if !self.is_current(&state) {
                return Err(LoadOutcome::Cancelled);
            }
            let shown = engine
                .resize(self.element, image.size())
                .and_then(|()| engine.display_image(self.element, Arc::clone(image)));
            if shown.is_ok() {
                // Keyed on the requested identifier: a medical load that fell
                // back to raster still reports its dimensions.
                let metadata = ImageId::from_url(&self.url)
                    .is_medical()
                    .then(|| extract(image));
                state.phase = Phase::Displayed;
                state.image = Some(Arc::clone(image));
                state.metadata = metadata.clone();
                state.container = Some(image.size());
                state.error = None;
                self.bind_tools();
                Ok(metadata)
            } else {
                shown.map(|()| None)
            }
        };
        match shown {
            Ok(metadata) => {
                log::info!(
                    "{}: displayed {}x{} image",
                    self.viewport,
                    image.width(),
                    image.height()
                );
                Ok(metadata)
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    fn bind_tools(&self) {
        let tools = &self.context.tools;
        let bound = tools
            .register_all()
            .and_then(|()| tools.bind_tool_to_element(self.element))
            .and_then(|()| tools.activate(self.element, ToolName::Pan, ButtonMask::PRIMARY));
        if let Err(err) = bound {
            log::warn!("{}: default tools unavailable: {err}", self.viewport);
        }
    }

    fn settle_resize(&self, size: Size) {
        let state = self.state.lock();
        if !self.is_current(&state) || state.phase != Phase::Displayed {
            return;
        }
        if let Err(err) = self.context.rendering_engine().resize(self.element, size) {
            log::debug!("{}: settle resize skipped: {err}", self.viewport);
        }
    }

    fn fail(&self, err: ViewerError) -> LoadOutcome {
        {
            let mut state = self.state.lock();
            if !self.is_current(&state) {
                return LoadOutcome::Cancelled;
            }
            state.phase = Phase::Errored;
            state.error = Some(err.clone());
            state.abort = None;
        }
        log::error!("{}: {} failed: {err}", self.viewport, self.url);
        self.observer.on_error(self.viewport, &err);
        LoadOutcome::Failed(err)
    }
}
