// ⏱️ Debouncer - timer plus cancel token
//
// Each schedule() cancels whatever was scheduled before it, so only the
// last value inside a burst reaches the sink.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Default quiet period before a scheduled value is delivered
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct Debouncer<T> {
    window: Duration,
    sink: Sink<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(window: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Debouncer {
            window,
            sink: Arc::new(sink),
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Deliver `value` after the window unless another schedule comes first
    ///
    /// Outside a tokio runtime there is no timer to wait on, so the value is
    /// delivered immediately.
    pub fn schedule(&self, value: T) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        match Handle::try_current() {
            Ok(handle) => {
                let sink = Arc::clone(&self.sink);
                let window = self.window;
                *pending = Some(handle.spawn(async move {
                    tokio::time::sleep(window).await;
                    sink(value);
                }));
            }
            Err(_) => {
                drop(pending);
                tracing::debug!("No async runtime; delivering debounced value immediately");
                (self.sink)(value);
            }
        }
    }

    /// Drop the pending value, if any
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }
    }
}
