//! # SharedQueue: FIFO queue for reference-kind volatile entries.
//!
//! Multi-producer, multi-consumer, unbounded. Producers never block; consumers
//! wait with a timeout that also races the caller's [`CancellationToken`], so a
//! consumer loop always reaches its next cancellation check.
//!
//! ```text
//! producer ── push() ──► [ VecDeque ] ──► pop(timeout, token) ── consumer
//!                             │
//!                          Notify (one permit per push)
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Concurrency-safe FIFO queue shared by identity through [`SharedState`](crate::SharedState).
#[derive(Debug)]
pub struct SharedQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T: Send> SharedQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    /// Appends an item and wakes one waiting consumer.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Removes the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Removes the oldest item, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout or when `token` is cancelled.
    pub async fn pop(&self, timeout: Duration, token: &CancellationToken) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }

            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // re-check after registering interest, a push may have raced us
            if let Some(item) = self.try_pop() {
                return Some(item);
            }

            tokio::select! {
                _ = &mut notified => continue,
                _ = time::sleep_until(deadline) => return self.try_pop(),
                _ = token.cancelled() => return None,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T: Send> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
