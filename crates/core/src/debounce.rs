//! Debounce primitive.
//!
//! Turns a fast-changing input into a "settled" value that only updates after
//! the input has been quiet for the configured delay. The initial value is
//! settled immediately.
//!
//! Every timer that fires uninterrupted re-emits, even if the value equals
//! the previously settled one; deduplication is the consumer's job.
//!
//! The delay can be changed while running. A change restarts the quiet
//! period of a pending value with the new delay.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Debounced value backed by a background timer task.
///
/// Dropping the debouncer (or calling [`Debouncer::cancel`]) aborts any
/// pending timer, so nothing is emitted after teardown.
#[derive(Debug)]
pub struct Debouncer<T> {
    input: watch::Sender<T>,
    settled: watch::Receiver<T>,
    delay: watch::Sender<Duration>,
    task: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start debouncing with an already-settled initial value.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(initial: T, delay: Duration) -> Self {
        let (input, input_rx) = watch::channel(initial.clone());
        let (settled_tx, settled) = watch::channel(initial);
        let (delay, delay_rx) = watch::channel(delay);
        let task = tokio::spawn(run(input_rx, settled_tx, delay_rx));
        Self { input, settled, delay, task }
    }

    /// Feed a new input value, restarting the quiet period.
    pub fn set(&self, value: T) {
        self.input.send_replace(value);
    }

    /// Most recently settled value.
    pub fn settled(&self) -> T {
        self.settled.borrow().clone()
    }

    /// Receiver notified on every emission. The current value counts as seen.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        let mut rx = self.settled.clone();
        rx.borrow_and_update();
        rx
    }

    pub fn delay(&self) -> Duration {
        *self.delay.borrow()
    }

    /// Change the quiet period. A pending value waits the new delay from now.
    pub fn set_delay(&self, delay: Duration) {
        self.delay.send_if_modified(|current| {
            if *current == delay {
                return false;
            }
            *current = delay;
            true
        });
    }

    /// Abort the timer task; pending input is discarded.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<T: Clone>(
    mut input: watch::Receiver<T>, settled: watch::Sender<T>, mut delay_rx: watch::Receiver<Duration>,
) {
    let mut pending: Option<T> = None;
    loop {
        match pending.take() {
            None => {
                if input.changed().await.is_err() {
                    return;
                }
                pending = Some(input.borrow_and_update().clone());
            }
            Some(value) => {
                let delay = *delay_rx.borrow_and_update();
                tokio::select! {
                    changed = input.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        pending = Some(input.borrow_and_update().clone());
                    }
                    changed = delay_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        pending = Some(value);
                    }
                    _ = sleep(delay) => {
                        tracing::debug!(delay_ms = delay.as_millis() as u64, "debounced value settled");
                        settled.send_replace(value);
                    }
                }
            }
        }
    }
}
