//! Cancellable delayed re-invocation
//!
//! The dispatch loop retries itself after a rate-limit wait. `RetryTimer`
//! wraps "sleep, then run this" in an abortable tokio task so that only the
//! most recently computed wait target has a live timer.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// A single-slot, cancellable delay timer.
///
/// Scheduling a new delay aborts the previous one; dropping the timer aborts
/// any pending delay.
#[derive(Debug, Default)]
pub(crate) struct RetryTimer {
    handle: Option<JoinHandle<()>>,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Run `task` after `delay`, replacing any previously scheduled run.
    pub fn schedule<F, Fut>(&mut self, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        debug!(?delay, "RetryTimer::schedule");
        self.handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            task().await;
        }));
    }

    /// Abort the pending delay, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fires_after_delay() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut timer = RetryTimer::new();

        let counter = fired.clone();
        timer.schedule(Duration::from_millis(100), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_delay() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut timer = RetryTimer::new();

        let counter = fired.clone();
        timer.schedule(Duration::from_millis(100), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = fired.clone();
        timer.schedule(Duration::from_millis(200), move || async move {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        sleep(Duration::from_millis(300)).await;
        // Only the replacement ran.
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut timer = RetryTimer::new();

        let counter = fired.clone();
        timer.schedule(Duration::from_millis(50), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();

        sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
