//! Typed observer registry.
//!
//! Listeners subscribe with a closure and receive a [`Subscription`] handle.
//! Unsubscribing is idempotent; dropping the handle without unsubscribing
//! leaves the listener registered for the registry's lifetime.

/// Handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

/// A list of listeners for one event type.
pub struct EventRegistry<E> {
    next_id: u64,
    listeners: Vec<(u64, Box<dyn FnMut(&E)>)>,
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventRegistry<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'static) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        Subscription(id)
    }

    /// Remove a listener. Unknown or already-removed handles are ignored.
    pub fn unsubscribe(&mut self, subscription: &Subscription) {
        self.listeners.retain(|(id, _)| *id != subscription.0);
    }

    /// Notify every listener, in subscription order.
    pub fn emit(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
