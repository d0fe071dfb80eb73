use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A background task owned by exactly one view.
///
/// The task receives a child of the view's token; cancelling either one stops it.
pub struct Timer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Timer {
    pub fn spawn<F, Fut>(parent: &CancellationToken, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let handle = tokio::spawn(body(token.clone()));
        Self { token, handle }
    }

    /// Runs `callback` every `period`, first one period from now.
    pub fn periodic<C>(parent: &CancellationToken, period: Duration, callback: C) -> Self
    where
        C: Fn() + Send + Sync + 'static,
    {
        Self::spawn(parent, move |token| async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if token.is_cancelled() {
                    break;
                }
                callback();
            }
        })
    }

    #[allow(dead_code)]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[allow(dead_code)]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(count: &Arc<AtomicUsize>) -> impl Fn() + Send + Sync + 'static {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_fires_every_period() {
        let root = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _timer = Timer::periodic(&root, Duration::from_millis(1_000), counting(&count));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_timer() {
        let root = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let timer = Timer::periodic(&root, Duration::from_millis(100), counting(&count));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        timer.cancel();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_reaches_timer() {
        let root = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let timer = Timer::periodic(&root, Duration::from_millis(100), counting(&count));

        root.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(timer.is_cancelled());
        assert!(timer.is_finished());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
