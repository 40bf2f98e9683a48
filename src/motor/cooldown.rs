// Deferred motor stop
//
// Idle -> Armed -> (fires -> Idle) | (cancelled -> Idle)

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

type CallbackFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type BoxedCallback = Arc<dyn Fn() -> CallbackFuture + Send + Sync>;

/// Schedules one callback invocation after a timeout. At most one is pending.
pub struct CooldownTimer {
    callback: BoxedCallback,
    task: Option<JoinHandle<()>>,
}

impl CooldownTimer {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            callback: Arc::new(move || -> CallbackFuture { Box::pin(callback()) }),
            task: None,
        }
    }

    /// Arm the timer, replacing any pending invocation
    pub fn start(&mut self, timeout: Duration) {
        self.cancel();

        trace!("Cooldown armed for {:?}", timeout);
        let callback = Arc::clone(&self.callback);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            callback().await;
        }));
    }

    /// Drop the pending invocation, if any
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                trace!("Cooldown cancelled");
            }
            task.abort();
        }
    }

    /// Whether an invocation is still pending
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for CooldownTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn counting_timer() -> (CooldownTimer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let timer = CooldownTimer::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (timer, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_exactly_once() {
        let (mut timer, calls) = counting_timer();
        timer.start(Duration::from_millis(100));
        assert!(timer.is_armed());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_deadline_prevents_fire() {
        let (mut timer, calls) = counting_timer();
        timer.start(Duration::from_millis(100));

        sleep(Duration::from_millis(50)).await;
        timer.cancel();
        assert!(!timer.is_armed());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_pending_invocation() {
        let (mut timer, calls) = counting_timer();
        timer.start(Duration::from_millis(100));
        sleep(Duration::from_millis(60)).await;

        // Re-arm before the first deadline: only the second one may fire
        timer.start(Duration::from_millis(100));
        sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_when_idle_is_noop() {
        let (mut timer, calls) = counting_timer();
        timer.cancel();
        assert!(!timer.is_armed());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (mut timer, calls) = counting_timer();
        timer.start(Duration::from_millis(100));
        drop(timer);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
