//! Unbounded FIFO work queue.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use tokio::sync::Notify;

/// A FIFO queue shared by any number of producers and consumers.
///
/// Consumers may block a thread ([`dequeue_blocking`](Self::dequeue_blocking)),
/// suspend a task ([`dequeue`](Self::dequeue)) or poll
/// ([`dequeue_nonblocking`](Self::dequeue_nonblocking)).
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    notify: Notify,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").field("len", &self.len()).finish()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Append an item and wake one waiting consumer.
    pub fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
        self.notify.notify_one();
    }

    /// Remove the oldest item, blocking the calling thread until one exists.
    pub fn dequeue_blocking(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.available.wait(&mut items);
        }
    }

    /// Remove the oldest item if there is one.
    pub fn dequeue_nonblocking(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Remove the oldest item, suspending the task until one exists.
    pub async fn dequeue(&self) -> T {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an enqueue in between is not missed.
            notified.as_mut().enable();

            if let Some(item) = self.dequeue_nonblocking() {
                return item;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
