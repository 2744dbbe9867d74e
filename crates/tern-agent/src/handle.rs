//! A cloneable handle for cancelling a running turn from external code.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle for a turn running in the background.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct TurnHandle {
    pub(crate) cancel: CancellationToken,
    pub(crate) finished: Arc<tokio::sync::Notify>,
    pub(crate) is_running: Arc<AtomicBool>,
}

impl Default for TurnHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnHandle {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            finished: Arc::new(tokio::sync::Notify::new()),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort the turn. The stream ends after an `Error { "Cancelled" }` event.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Whether the turn has been aborted.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The cancellation token (for callers that select on it directly).
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the turn is still producing events.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.is_running.store(running, Ordering::Release);
        if !running {
            self.finished.notify_waiters();
        }
    }

    /// Wait until the turn finishes.
    pub async fn wait(&self) {
        let notified = self.finished.notified();
        if !self.is_running.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    /// Wait until the turn finishes, with a timeout.
    /// Returns `true` if the turn finished, `false` on timeout.
    pub async fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        if !self.is_running() {
            return true;
        }
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_abort_is_shared_across_clones() {
        let handle = TurnHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.abort();
        assert!(handle.is_cancelled());
        assert!(handle.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_returns_when_idle() {
        let handle = TurnHandle::new();
        assert!(handle.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_wait_for_finish() {
        let handle = TurnHandle::new();
        handle.set_running(true);
        assert!(!handle.wait_timeout(Duration::from_millis(10)).await);

        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.wait_timeout(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.set_running(false);
        assert!(task.await.unwrap());
    }
}
