//! In-memory fan-out of newly committed log entries.
//!
//! Every subscriber gets its own bounded queue. [`Broadcaster::publish`] hands
//! each entry to every registered queue with `try_send` and never waits:
//!
//! - delivery is at-most-once, without acknowledgement or retry;
//! - there is no backlog, so a subscriber only sees entries published after
//!   it subscribed;
//! - when a subscriber's queue is full, the **newest** notification is dropped
//!   for that subscriber alone (logged at `warn`) and it stays subscribed;
//! - subscribers whose receiving side is gone are pruned on the next publish.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tamperlog_types::EventLogEntry;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Queue depth per subscriber when none is configured.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

type SubscriberMap = HashMap<Uuid, mpsc::Sender<Arc<EventLogEntry>>>;

/// Publish/subscribe hub for committed entries.
///
/// Cloning is cheap; clones share the same subscriber set.
///
/// Uses `std::sync::RwLock` because every acquisition is a brief map
/// operation that never spans an `.await`, and `publish` is called from
/// blocking (non-async) code.
#[derive(Clone)]
pub struct Broadcaster {
    subscribers: Arc<RwLock<SubscriberMap>>,
    capacity: usize,
}

/// Outcome of a single [`Broadcaster::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers whose queue accepted the entry.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
    /// Subscribers found disconnected and removed.
    pub pruned: usize,
}

impl Broadcaster {
    /// Creates a broadcaster whose subscribers each buffer up to `capacity`
    /// undelivered entries. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new subscriber. It receives only entries published from
    /// now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();

        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);

        tracing::debug!(subscriber = %id, "subscriber registered");

        Subscription {
            id,
            receiver: rx,
            hub: self.clone(),
        }
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();

        if removed {
            tracing::debug!(subscriber = %id, "subscriber removed");
        }
        removed
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Offers `entry` to every registered subscriber without blocking.
    pub fn publish(&self, entry: Arc<EventLogEntry>) -> Delivery {
        let mut delivery = Delivery::default();
        let mut closed = Vec::new();

        {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);

            for (id, sender) in subscribers.iter() {
                match sender.try_send(Arc::clone(&entry)) {
                    Ok(()) => delivery.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        delivery.dropped += 1;
                        tracing::warn!(
                            subscriber = %id,
                            sequence = entry.sequence,
                            "dropping notification for slow subscriber"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for id in &closed {
                subscribers.remove(id);
            }
            delivery.pruned = closed.len();
            tracing::debug!(count = closed.len(), "pruned disconnected subscribers");
        }

        delivery
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

/// A registered listener. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<Arc<EventLogEntry>>,
    hub: Broadcaster,
}

impl Subscription {
    /// Handle identifying this subscriber to [`Broadcaster::unsubscribe`].
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for the next entry. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Arc<EventLogEntry>> {
        self.receiver.recv().await
    }

    /// Returns the next queued entry without waiting, if there is one.
    pub fn try_recv(&mut self) -> Option<Arc<EventLogEntry>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
