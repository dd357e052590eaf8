use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// In-memory FIFO shared between the loops of one process.
///
/// Used for the submission, processing and result queues. Items move by
/// value: whatever `pop` returns is no longer in the queue.
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    /// Append an item at the tail.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Put an item back at the head, ahead of everything queued after it.
    pub fn requeue(&self, item: T) {
        self.items.lock().push_front(item);
        self.available.notify_one();
    }

    /// Remove the head item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Wait until an item is available and remove it.
    ///
    /// Cancel-safe: dropping the future never loses an item.
    pub async fn pop(&self) -> T {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                // Another waiter may be owed the permit we consumed.
                if !self.is_empty() {
                    self.available.notify_one();
                }
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

impl<T: Clone> WorkQueue<T> {
    /// Copy of the current contents, head first.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().iter().cloned().collect()
    }
}
