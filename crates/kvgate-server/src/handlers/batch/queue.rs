//! Closable work queue shared by the workers of one batch.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A FIFO of pending items that workers pull from one at a time.
///
/// Closing the queue drops every item not yet handed out, so no worker
/// starts new work afterwards. Items already popped are unaffected.
pub(crate) struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> WorkQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: items.into_iter().collect(),
                closed: false,
            }),
        }
    }

    // A panicking worker never holds the lock across user code, so the
    // queue state is still consistent after poisoning.
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the next item, or `None` once the queue is drained or closed.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        inner.items.pop_front()
    }

    /// Stops handing out items. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.items.clear();
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of items not yet handed out.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }
}
