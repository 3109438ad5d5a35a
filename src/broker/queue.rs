//! Bounded drop-oldest queue for one sink.
//!
//! A FIFO of capacity [`QUEUE_SIZE`]. When a producer enqueues into a full
//! queue, the entire queue is discarded before the new item is appended —
//! not a partial eviction of just the oldest entry. A payload is a snapshot
//! of current state; once a sink has fallen behind, the stale entries ahead
//! of the newest one are worthless, so there is nothing worth keeping them
//! for.
//!
//! Single producer (the dataset's source loop), single consumer (the
//! sink's writer loop).

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::constants::QUEUE_SIZE;

/// A single sink's bounded, drop-oldest payload queue.
#[derive(Debug)]
pub struct SinkQueue {
    items: Mutex<VecDeque<Bytes>>,
    notify: Notify,
}

impl SinkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(QUEUE_SIZE)),
            notify: Notify::new(),
        }
    }

    /// Append `item`. If the queue is already at [`QUEUE_SIZE`], every
    /// current entry is discarded first, so only `item` survives.
    pub fn enqueue(&self, item: Bytes) {
        {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            if items.len() >= QUEUE_SIZE {
                items.clear();
            }
            items.push_back(item);
        }
        self.notify.notify_one();
    }

    /// Wait up to `deadline` for an item. Returns `None` if the deadline
    /// elapses with nothing enqueued.
    pub async fn dequeue(&self, deadline: Duration) -> Option<Bytes> {
        loop {
            // Register for a wakeup before checking state, so an enqueue
            // that races with this check is never missed.
            let notified = self.notify.notified();

            if let Some(item) = self.pop() {
                return Some(item);
            }

            match timeout(deadline, notified).await {
                Ok(()) => {
                    if let Some(item) = self.pop() {
                        return Some(item);
                    }
                    // Spurious wakeup (e.g. another waiter drained it first);
                    // loop to re-check against the same deadline budget.
                }
                Err(_) => return None,
            }
        }
    }

    fn pop(&self) -> Option<Bytes> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Current number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SinkQueue {
    fn default() -> Self {
        Self::new()
    }
}
