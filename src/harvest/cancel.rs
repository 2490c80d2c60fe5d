use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation token shared between a caller and a running task.
///
/// Tasks observe cancellation only at their suspend points (timer waits and
/// the boundaries between collaborator calls).
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_canceled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn canceled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|canceled| *canceled).await;
    }

    /// Sleeps for `duration`; returns `false` if canceled first.
    pub async fn sleep(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.canceled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
