//! Transient, auto-dismissing notifications.
//!
//! A [`Toast`] holds at most one visible message at a time. `show` publishes
//! the message to the display sink and arms an auto-dismiss timer; showing
//! again before dismissal replaces the message in place and re-arms the one
//! pending timer. `teardown` cancels the timer and clears the message.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default time a message stays visible.
pub const DEFAULT_DISMISS_AFTER: Duration = Duration::from_millis(3000);

/// Sink receiving display updates: `Some(message)` when a message appears or
/// is replaced, `None` when it is dismissed or torn down.
pub type ToastSink = Arc<dyn Fn(Option<&str>) + Send + Sync>;

struct ToastState {
    message: Option<String>,
    timer: Option<JoinHandle<()>>,
}

/// Transient on-screen message with an auto-dismiss timer.
///
/// # Example
///
/// ```rust,no_run
/// use table_mirror::Toast;
///
/// # async fn example() {
/// let toast = Toast::new(|msg| match msg {
///     Some(text) => println!("showing: {}", text),
///     None => println!("dismissed"),
/// });
/// toast.show("Saved");
/// # }
/// ```
#[derive(Clone)]
pub struct Toast {
    sink: ToastSink,
    dismiss_after: Duration,
    state: Arc<Mutex<ToastState>>,
}

impl Toast {
    /// Create a notifier with the default dismiss duration.
    pub fn new(sink: impl Fn(Option<&str>) + Send + Sync + 'static) -> Self {
        Self::with_duration(sink, DEFAULT_DISMISS_AFTER)
    }

    /// Create a notifier with a custom dismiss duration.
    pub fn with_duration(
        sink: impl Fn(Option<&str>) + Send + Sync + 'static,
        dismiss_after: Duration,
    ) -> Self {
        Self {
            sink: Arc::new(sink),
            dismiss_after,
            state: Arc::new(Mutex::new(ToastState {
                message: None,
                timer: None,
            })),
        }
    }

    /// Show `message`, replacing any message currently visible, and arm the
    /// auto-dismiss timer. Must be called from within a tokio runtime.
    pub fn show(&self, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        // One pending dismissal at most: replacing the message re-arms it.
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        (self.sink)(Some(&message));
        state.message = Some(message);

        let sink = Arc::clone(&self.sink);
        let shared = Arc::clone(&self.state);
        // Deadline is fixed at show time; the spawned task may be polled
        // arbitrarily later.
        let deadline = tokio::time::Instant::now() + self.dismiss_after;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut state = shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.message = None;
            state.timer = None;
            sink(None);
        }));
    }

    /// The currently visible message, if any.
    pub fn message(&self) -> Option<String> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner).message.clone()
    }

    /// Cancel any pending timer and remove the message. Idempotent.
    pub fn teardown(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.message.take().is_some() {
            (self.sink)(None);
        }
    }
}

impl Drop for ToastState {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts dismiss (`None`) callbacks so tests can assert no double-fire.
    fn counting_toast(dismiss_after: Duration) -> (Toast, Arc<AtomicUsize>) {
        let dismissals = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&dismissals);
        let toast = Toast::with_duration(
            move |msg| {
                if msg.is_none() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            dismiss_after,
        );
        (toast, dismissals)
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_dismiss_after_duration() {
        let (toast, dismissals) = counting_toast(Duration::from_millis(3000));
        toast.show("saved");
        assert_eq!(toast.message().as_deref(), Some("saved"));

        tokio::time::advance(Duration::from_millis(2999)).await;
        assert_eq!(toast.message().as_deref(), Some("saved"));

        tokio::time::advance(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(toast.message(), None);
        assert_eq!(dismissals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_deadline_fixed_at_show_time() {
        let (toast, dismissals) = counting_toast(Duration::from_millis(3000));
        toast.show("saved");

        // Time advanced before the timer task has ever been polled must not
        // push the deadline out: it was fixed when show() ran.
        tokio::time::advance(Duration::from_millis(1000)).await;
        tokio::time::advance(Duration::from_millis(1000)).await;
        tokio::time::advance(Duration::from_millis(1001)).await;
        tokio::task::yield_now().await;

        assert_eq!(toast.message(), None);
        assert_eq!(dismissals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reshow_replaces_in_place_and_rearms() {
        let (toast, dismissals) = counting_toast(Duration::from_millis(3000));
        toast.show("first");
        tokio::time::advance(Duration::from_millis(2000)).await;

        toast.show("second");
        assert_eq!(toast.message().as_deref(), Some("second"));

        // Old timer would have fired here; it was cancelled
        tokio::time::advance(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        assert_eq!(toast.message().as_deref(), Some("second"));
        assert_eq!(dismissals.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1501)).await;
        tokio::task::yield_now().await;
        assert_eq!(toast.message(), None);
        assert_eq!(dismissals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_pending_timer() {
        let (toast, dismissals) = counting_toast(Duration::from_millis(3000));
        toast.show("going away");
        toast.teardown();
        assert_eq!(toast.message(), None);
        assert_eq!(dismissals.load(Ordering::SeqCst), 1);

        // Advancing past the original deadline must not double-fire
        tokio::time::advance(Duration::from_millis(5000)).await;
        tokio::task::yield_now().await;
        assert_eq!(dismissals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_is_idempotent_and_safe_without_show() {
        let (toast, dismissals) = counting_toast(Duration::from_millis(3000));
        toast.teardown();
        toast.teardown();
        assert_eq!(dismissals.load(Ordering::SeqCst), 0);

        toast.show("x");
        toast.teardown();
        toast.teardown();
        assert_eq!(dismissals.load(Ordering::SeqCst), 1);
    }
}
