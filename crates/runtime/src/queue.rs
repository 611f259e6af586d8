//! MPMC FIFO queue
//!
//! The request, completed, and result queues are all instances of this
//! wrapper over `crossbeam_queue::SegQueue`: lock-free, unbounded,
//! multi-producer multi-consumer, FIFO per producer.

use crossbeam_queue::SegQueue;

/// An unbounded MPMC FIFO queue.
pub struct WorkQueue<T> {
    inner: SegQueue<T>,
}

impl<T> WorkQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        WorkQueue {
            inner: SegQueue::new(),
        }
    }

    /// Append an item.
    pub fn push(&self, item: T) {
        self.inner.push(item);
    }

    /// Remove and return the oldest item, or `None` when empty.
    pub fn pop(&self) -> Option<T> {
        self.inner.pop()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
