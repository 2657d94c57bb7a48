//! Typed notification channels.
//!
//! An `EventChannel` is the update path between the service and its
//! collaborators (session, engine) and between the service and its clients.
//! Handlers run on the publishing thread, in subscription order. Each
//! `publish` delivers to a snapshot of the subscribers taken at publish time,
//! so a handler may subscribe or unsubscribe (itself included) while running.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, unbounded};
use parking_lot::Mutex;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Publish/subscribe channel for events of type `E`.
pub struct EventChannel<E> {
    handlers: Mutex<Vec<(SubscriptionId, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventChannel<E> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a handler. Handlers are invoked in registration order.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler.
    ///
    /// Returns false if it was not subscribed (already removed, or the
    /// channel was cleared). Never fails.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(sub, _)| *sub != id);
        handlers.len() != before
    }

    /// Deliver `event` to every current subscriber.
    pub fn publish(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            handler(event);
        }
    }

    /// Drop every subscriber.
    pub fn clear(&self) {
        self.handlers.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl<E: Clone + Send + 'static> EventChannel<E> {
    /// Subscribe with a channel receiver instead of a callback.
    ///
    /// Events published after the receiver is dropped are discarded.
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<E>) {
        let (tx, rx) = unbounded();
        let id = self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }
}

impl<E> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
