//! Invalidation signal shared across coordinators.
//!
//! A strictly increasing counter. Whoever knows that server-side data changed
//! (an import finished, a record was edited elsewhere) calls [`InvalidationBus::bump`].
//! Coordinators remember the last value they observed and bypass the cache
//! when the current value differs; they only ever compare for inequality.

use tokio::sync::watch;

/// Monotonic invalidation counter with change notification.
#[derive(Debug)]
pub struct InvalidationBus {
    tx: watch::Sender<u64>,
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationBus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Advance the counter and notify subscribers. Returns the new value.
    pub fn bump(&self) -> u64 {
        let mut next = 0;
        self.tx.send_modify(|value| {
            *value += 1;
            next = *value;
        });
        tracing::info!(signal = next, "invalidation signal bumped");
        next
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Receiver that wakes on every bump after subscription.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_is_strictly_increasing() {
        let bus = InvalidationBus::new();
        assert_eq!(bus.current(), 0);
        assert_eq!(bus.bump(), 1);
        assert_eq!(bus.bump(), 2);
        assert_eq!(bus.current(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_sees_bump() {
        let bus = InvalidationBus::new();
        bus.bump();
        let mut rx = bus.subscribe();
        assert!(!rx.has_changed().unwrap());

        bus.bump();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
    }
}
