//! Bounded drop-oldest queue for pending snapshot sends.
//!
//! A slow or disconnected transport must never stall the update loop, so
//! pushes always succeed; once the queue is full the oldest pending
//! snapshot is discarded. Dropping a pending send never affects the
//! runtime's own state history.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

pub(crate) struct SnapshotQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    available: Notify,
}

impl<T> SnapshotQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            available: Notify::new(),
        }
    }

    /// Enqueue, discarding the oldest pending item when full.
    pub(crate) fn push(&self, item: T) {
        {
            let mut items = self.items.lock();
            if items.len() == self.capacity {
                items.pop_front();
                tracing::warn!("snapshot queue full, oldest pending snapshot dropped");
            }
            items.push_back(item);
        }
        self.available.notify_one();
    }

    /// Wait for the next item in FIFO order.
    pub(crate) async fn pop(&self) -> T {
        loop {
            // Register interest before checking, so a push between the
            // check and the await cannot be missed.
            let notified = self.available.notified();
            if let Some(item) = self.items.lock().pop_front() {
                return item;
            }
            notified.await;
        }
    }

    pub(crate) fn clear(&self) {
        self.items.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }
}
