use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

struct ThrottleState<T> {
    latest: Option<T>,
    task: Option<JoinHandle<()>>,
}

type Action<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Broadcast-latest throttle.
///
/// The first trigger opens a window; when it closes the action runs once with
/// the value of the most recent trigger. Triggers inside an open window only
/// replace that value. Dropping the throttle does not cancel a pending run.
pub struct Throttle<T> {
    state: Arc<Mutex<ThrottleState<T>>>,
    window: Duration,
    action: Action<T>,
}

impl<T: Send + 'static> Throttle<T> {
    pub fn new<F, Fut>(window: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(ThrottleState {
                latest: None,
                task: None,
            })),
            window,
            action: Arc::new(move |value: T| -> BoxFuture<'static, ()> { Box::pin(action(value)) }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ThrottleState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn trigger(&self, value: T) {
        let mut state = self.lock();
        state.latest = Some(value);
        if state.task.is_some() {
            return;
        }

        let shared = Arc::clone(&self.state);
        let action = Arc::clone(&self.action);
        let window = self.window;
        state.task = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let latest = {
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                state.task = None;
                state.latest.take()
            };
            if let Some(value) = latest {
                action(value).await;
            }
        }));
    }

    /// Drops the pending value without running the action.
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.latest = None;
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().task.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_throttle(window: Duration) -> (Throttle<u32>, Arc<Mutex<Vec<u32>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let throttle = Throttle::new(window, move |value: u32| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(value);
            }
        });
        (throttle, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_with_latest_value() {
        let (throttle, fired) = recording_throttle(Duration::from_secs(3));

        for value in 1..=5 {
            throttle.trigger(value);
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*fired.lock().unwrap(), vec![5]);
        assert!(!throttle.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_window_fires_again() {
        let (throttle, fired) = recording_throttle(Duration::from_secs(1));

        throttle.trigger(1);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        throttle.trigger(2);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(*fired.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_value() {
        let (throttle, fired) = recording_throttle(Duration::from_secs(1));

        throttle.trigger(7);
        throttle.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(fired.lock().unwrap().is_empty());
    }
}
