//! Per-load cancellation handles.

use tokio::sync::watch;

/// Owner side of a cancellation handle. One is created for every load a
/// viewport starts.
#[derive(Debug)]
pub struct AbortController {
    aborted: watch::Sender<bool>,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    pub fn new() -> Self {
        let (aborted, _) = watch::channel(false);
        Self { aborted }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            aborted: self.aborted.subscribe(),
        }
    }

    pub fn abort(&self) {
        self.aborted.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.aborted.borrow()
    }
}

/// Observer side of an [`AbortController`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    aborted: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal nobody can abort.
    pub fn never() -> Self {
        AbortController::new().signal()
    }

    pub fn is_aborted(&self) -> bool {
        *self.aborted.borrow()
    }

    /// Resolves once the controller aborts. Pends forever if the controller
    /// is dropped without aborting.
    pub async fn aborted(&self) {
        let mut aborted = self.aborted.clone();
        if aborted.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_abort_wakes_waiting_signal() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.is_aborted());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });
        controller.abort();
        waiter.await.unwrap();
        assert!(signal.is_aborted());
        assert!(controller.is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_signal_does_not_resolve() {
        let signal = AbortSignal::never();
        let outcome = tokio::time::timeout(Duration::from_secs(5), signal.aborted()).await;
        assert!(outcome.is_err());
        assert!(!signal.is_aborted());
    }
}
