use super::{DecoderConfig, EngineError, RenderingEngine};
use crate::model::ImageKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Where the shared engine is in its one-time setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    Pending,
    Ready,
    Failed,
}

impl InitStatus {
    pub fn is_settled(self) -> bool {
        self != InitStatus::Pending
    }
}

/// Bounded linear backoff for engine initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the attempt after `attempt` (1-based), or `None` once the
    /// attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.base_delay * attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500))
    }
}

/// Process-wide engine plus its initialization status.
///
/// Clone the `Arc` into every component that needs the engine; tests build a
/// fresh one per case (or call [`EngineState::reset`]).
pub struct EngineState {
    engine: Arc<dyn RenderingEngine>,
    policy: RetryPolicy,
    decoder: DecoderConfig,
    status: watch::Sender<InitStatus>,
    init_lock: Mutex<()>,
}

impl EngineState {
    pub fn new(engine: Arc<dyn RenderingEngine>, policy: RetryPolicy) -> Self {
        let (status, _) = watch::channel(InitStatus::Pending);
        Self {
            engine,
            policy,
            decoder: DecoderConfig::conservative(),
            status,
            init_lock: Mutex::new(()),
        }
    }

    pub fn with_decoder(mut self, decoder: DecoderConfig) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn engine(&self) -> &Arc<dyn RenderingEngine> {
        &self.engine
    }

    pub fn status(&self) -> InitStatus {
        *self.status.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == InitStatus::Ready
    }

    pub fn subscribe(&self) -> watch::Receiver<InitStatus> {
        self.status.subscribe()
    }

    pub fn reset(&self) {
        self.status.send_replace(InitStatus::Pending);
    }

    /// Bring the engine up, retrying transient failures.
    ///
    /// Returns `true` once ready. A failed engine stays failed for the life
    /// of this state.
    pub async fn initialize(&self) -> bool {
        if self.is_ready() {
            return true;
        }

        let _guard = self.init_lock.lock().await;
        match self.status() {
            InitStatus::Ready => return true,
            InitStatus::Failed => return false,
            InitStatus::Pending => {}
        }

        let mut attempt = 1;
        loop {
            match self.try_initialize() {
                Ok(()) => {
                    log::info!("Rendering engine initialized (attempt {attempt})");
                    self.status.send_replace(InitStatus::Ready);
                    return true;
                }
                Err(EngineError::Environment(reason)) => {
                    log::error!("Rendering engine cannot run here: {reason}");
                    self.status.send_replace(InitStatus::Failed);
                    return false;
                }
                Err(err) => match self.policy.delay_for(attempt) {
                    Some(delay) => {
                        log::warn!(
                            "Engine initialization attempt {attempt} failed ({err}), retrying in {delay:?}"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        log::error!(
                            "Engine initialization failed after {attempt} attempts: {err}"
                        );
                        self.status.send_replace(InitStatus::Failed);
                        return false;
                    }
                },
            }
        }
    }

    /// Wait for another caller's initialization to settle.
    pub async fn wait_for_initialization(&self, timeout: Duration) -> bool {
        let mut status = self.status.subscribe();
        let settled = tokio::time::timeout(timeout, async move {
            status
                .wait_for(|status| status.is_settled())
                .await
                .map(|status| *status)
        })
        .await;
        matches!(settled, Ok(Ok(InitStatus::Ready)))
    }

    fn try_initialize(&self) -> Result<(), EngineError> {
        self.engine.check_dependencies()?;
        self.engine.register_image_loader(ImageKind::Raster)?;
        self.engine.register_image_loader(ImageKind::Medical)?;
        self.engine.configure_decoder(self.decoder);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FakeEngine;

    fn state_with(engine: Arc<FakeEngine>) -> EngineState {
        EngineState::new(engine, RetryPolicy::new(5, Duration::from_millis(100)))
    }

    #[test]
    fn test_policy_backoff_is_linear_and_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(5), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_registers_loaders_once() {
        let engine = Arc::new(FakeEngine::new());
        let state = state_with(engine.clone());
        assert!(state.initialize().await);
        assert!(state.initialize().await);
        assert_eq!(engine.check_calls(), 1);
        assert!(engine.has_loader(ImageKind::Medical));
        assert!(engine.has_loader(ImageKind::Raster));
        assert_eq!(engine.decoder_config(), DecoderConfig::conservative());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_with_backoff() {
        let engine = Arc::new(FakeEngine::new());
        engine.fail_dependency_checks(2, EngineError::DependencyUnavailable("dicom parser".into()));
        let state = state_with(engine.clone());

        let started = tokio::time::Instant::now();
        assert!(state.initialize().await);
        assert_eq!(engine.check_calls(), 3);
        // 100ms after attempt 1, 200ms after attempt 2.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let engine = Arc::new(FakeEngine::new());
        engine.fail_dependency_checks(10, EngineError::DependencyUnavailable("tools".into()));
        let state = state_with(engine.clone());
        let mut status = state.subscribe();

        assert!(!state.initialize().await);
        assert_eq!(engine.check_calls(), 5);
        assert_eq!(*status.borrow_and_update(), InitStatus::Failed);
        assert!(!state.initialize().await);
        assert_eq!(engine.check_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_environment_failure_does_not_retry() {
        let engine = Arc::new(FakeEngine::new());
        engine.fail_dependency_checks(1, EngineError::Environment("no runtime".into()));
        let state = state_with(engine.clone());
        assert!(!state.initialize().await);
        assert_eq!(engine.check_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_initialization_sees_ready_and_times_out() {
        let engine = Arc::new(FakeEngine::new());
        let state = Arc::new(state_with(engine));

        assert!(!state.wait_for_initialization(Duration::from_secs(1)).await);

        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_for_initialization(Duration::from_secs(5)).await })
        };
        assert!(state.initialize().await);
        assert!(waiter.await.unwrap());

        state.reset();
        assert!(!state.is_ready());
    }
}
