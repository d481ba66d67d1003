//! Multicast Event Registry
//!
//! Ordered list of handlers with subscribe/unsubscribe by handle. Handlers
//! are snapshotted before each notification so a handler may subscribe or
//! unsubscribe (itself or others) while being invoked.

use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`MultiEvent::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_handle: u64,
    handlers: Vec<(EventHandle, Handler<T>)>,
}

/// Event with any number of ordered handlers.
pub struct MultiEvent<T> {
    registry: Mutex<Registry<T>>,
}

impl<T> Default for MultiEvent<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for MultiEvent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiEvent")
            .field("handlers", &self.registry.lock().handlers.len())
            .finish()
    }
}

impl<T> MultiEvent<T> {
    /// Create an event with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_handle: 1,
                handlers: Vec::new(),
            }),
        }
    }

    /// Append a handler. Handlers run in subscription order.
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> EventHandle {
        let mut registry = self.registry.lock();
        let handle = EventHandle(registry.next_handle);
        registry.next_handle += 1;
        registry.handlers.push((handle, Arc::new(handler)));
        handle
    }

    /// Remove a handler. Returns `false` if the handle was not subscribed.
    pub fn unsubscribe(&self, handle: EventHandle) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.handlers.len();
        registry.handlers.retain(|(h, _)| *h != handle);
        registry.handlers.len() != before
    }

    /// Number of subscribed handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.registry.lock().handlers.len()
    }

    /// Invoke every handler subscribed at the time of the call.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Handler<T>> = self
            .registry
            .lock()
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            handler(value);
        }
    }
}
