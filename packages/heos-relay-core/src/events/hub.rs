//! Process-wide multicast point for upstream events.
//!
//! Every subscriber owns a bounded queue. [`FanOutHub::publish`] never waits:
//! a subscriber whose queue is full or whose receiver is gone is evicted, and
//! delivery to everyone else continues. Because events are published from a
//! single ingestion task, each subscriber sees them in upstream order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::heos::EventEnvelope;

/// Hub carrying annotated upstream envelopes.
pub type EventHub = FanOutHub<EventEnvelope>;

/// Multicast hub over a dynamic set of subscribers.
pub struct FanOutHub<T> {
    subscribers: DashMap<u64, mpsc::Sender<Arc<T>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl<T: Send + Sync + 'static> FanOutHub<T> {
    /// Creates a hub whose subscribers each buffer up to `buffer` events.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is zero.
    pub fn new(buffer: usize) -> Self {
        assert!(buffer > 0, "subscriber buffer must be >= 1");
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer,
        }
    }

    /// Registers a new subscriber.
    ///
    /// The returned [`Subscription`] unregisters itself when dropped.
    pub fn subscribe(self: &Arc<Self>) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, tx);
        log::debug!(
            "[Hub] Subscriber {} registered (total: {})",
            id,
            self.subscribers.len()
        );
        Subscription {
            id,
            rx,
            hub: Arc::clone(self),
        }
    }

    /// Delivers `event` to every registered subscriber.
    ///
    /// Returns the number of subscribers that accepted the event.
    pub fn publish(&self, event: T) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut evicted = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "[Hub] Subscriber {} fell {} events behind, dropping it",
                        entry.key(),
                        self.buffer
                    );
                    evicted.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => evicted.push(*entry.key()),
            }
        }

        // Removal must happen after iteration releases its shard locks
        for id in evicted {
            self.remove(id);
        }

        log::trace!("[Hub] Published event to {} subscriber(s)", delivered);
        delivered
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn remove(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            log::debug!(
                "[Hub] Subscriber {} unregistered (remaining: {})",
                id,
                self.subscribers.len()
            );
        }
    }
}

/// Receiving end of a hub registration.
pub struct Subscription<T: Send + Sync + 'static> {
    id: u64,
    rx: mpsc::Receiver<Arc<T>>,
    hub: Arc<FanOutHub<T>>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the hub has evicted this subscriber and its queue
    /// is drained.
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        self.rx.recv().await
    }

    /// Explicitly unregisters. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl<T: Send + Sync + 'static> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.hub.remove(self.id);
    }
}
