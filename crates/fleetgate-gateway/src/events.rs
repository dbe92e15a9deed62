//! Publish/subscribe event bus for node lifecycle notifications. Handlers
//! get an identity back so they can be removed, and a panic in one handler
//! never stops the rest from running.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::warn;

/// Identifies one subscription so it can later be removed with
/// [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Handler<T> {
    id: u64,
    f: Box<dyn Fn(T) + Send + Sync>,
}

/// A single-event-type fan-out point. The orchestrator owns one per event
/// kind (`onNodeRegistered`, `onNodeDeregistered`, `onNodeDead`) rather than
/// a generic multi-event bus, keeping each event's handler list separate.
pub struct EventBus<T> {
    handlers: Mutex<Vec<Handler<T>>>,
    next_id: AtomicU64,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self { handlers: Mutex::new(Vec::new()), next_id: AtomicU64::new(0) }
    }
}

impl<T: Clone> EventBus<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: impl Fn(T) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Handler { id, f: Box::new(handler) });
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).retain(|h| h.id != id.0);
    }

    /// Invoke every subscriber with a clone of `event`. A subscriber that
    /// panics is caught and logged; the remaining subscribers still run.
    pub(crate) fn fire(&self, event: T) {
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        for handler in handlers.iter() {
            let event = event.clone();
            let f = &handler.f;
            if std::panic::catch_unwind(AssertUnwindSafe(|| f(event))).is_err() {
                warn!(handler_id = handler.id, "event handler panicked, continuing with remaining subscribers");
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    #[test]
    fn fires_all_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let a = Arc::clone(&count);
        let b = Arc::clone(&count);
        bus.subscribe(move |_: u32| {
            a.fetch_add(1, Ordering::Relaxed);
        });
        bus.subscribe(move |_: u32| {
            b.fetch_add(1, Ordering::Relaxed);
        });
        bus.fire(1);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe(move |_: u32| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        bus.unsubscribe(id);
        bus.fire(1);
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_silence_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        bus.subscribe(|_: u32| panic!("boom"));
        bus.subscribe(move |_: u32| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        bus.fire(1);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
