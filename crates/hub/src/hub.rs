//! Fan-out of coordinator events to connected viewers.
//!
//! Each subscriber owns a bounded queue.  Sends never wait: a subscriber
//! whose queue is closed (viewer gone) or full (viewer stalled) is dropped
//! on the spot and the remaining subscribers are unaffected.

use std::collections::BTreeMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use crate::protocol::Event;

/// Events buffered per viewer before it is considered unreachable.
pub const SUBSCRIBER_QUEUE: usize = 64;

pub type SubscriberId = u64;

pub struct Subscription {
    pub id: SubscriberId,
    pub events: mpsc::Receiver<Event>,
}

pub struct Hub {
    next_id: SubscriberId,
    capacity: usize,
    subscribers: BTreeMap<SubscriberId, mpsc::Sender<Event>>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            next_id: 1,
            capacity: capacity.max(1),
            subscribers: BTreeMap::new(),
        }
    }

    /// Register a viewer and queue `initial` as its first event.
    pub fn subscribe(&mut self, initial: Event) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id;
        self.next_id += 1;

        // Fresh queue with capacity >= 1: cannot fail.
        let _ = tx.try_send(initial);
        self.subscribers.insert(id, tx);
        info!(subscriber = id, total = self.subscribers.len(), "viewer subscribed");

        Subscription { id, events: rx }
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            info!(subscriber = id, total = self.len(), "viewer unsubscribed");
        }
        if self.is_empty() {
            debug!("no viewers connected");
        }
    }

    /// Deliver `event` to every subscriber, dropping the unreachable ones.
    pub fn broadcast(&mut self, event: &Event) {
        self.subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = id, "viewer gone, removing");
                false
            }
            Err(TrySendError::Full(_)) => {
                debug!(subscriber = id, "viewer queue full, removing");
                false
            }
        });
    }

    /// Deliver `event` to one subscriber.  Returns false if it is gone.
    pub fn send_to(&mut self, id: SubscriberId, event: Event) -> bool {
        let Some(tx) = self.subscribers.get(&id) else {
            return false;
        };
        if tx.try_send(event).is_ok() {
            true
        } else {
            self.subscribers.remove(&id);
            false
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
