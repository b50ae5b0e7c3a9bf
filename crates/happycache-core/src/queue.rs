//! Closable MPMC work queue with blocking pop.
//!
//! An owning, generic queue rather than an intrusively-linked one:
//! ownership of `T` transfers on `push_*`/`pop_head`.
//!
//! Used three times in this crate: the dump pipeline's directory-frame
//! work list, and the load pipeline's work list and free list.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A closable, multi-producer multi-consumer FIFO queue.
///
/// `push_tail` preserves FIFO order relative to other `push_tail` calls.
/// `push_head` inserts at the front and is used for recursion priority
/// (the dump walker re-pushes the frame it's currently working on ahead of
/// everything else, to keep traversal depth-first and directory-handle
/// locality high).
///
/// Once `close` is called, `pop_head` still drains whatever was enqueued
/// before the close, then returns `None` forever after. Items pushed after
/// `close` have unspecified delivery — callers must not do this.
pub struct Queue<T> {
    // A single mutex protects both ends: `VecDeque` lets one lock cover
    // push/pop in O(1), unlike a separate head/tail lock design, which
    // would need a tail-reseating dance on the empty/non-empty transition.
    // The condvar shares that mutex, so the empty->non-empty wakeup is
    // trivially race-free: every push that makes the queue go from empty
    // to non-empty (or that closes it) holds the lock while notifying.
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Push to the back of the queue. FIFO relative to other `push_tail`s.
    pub fn push_tail(&self, item: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Push to the front of the queue, ahead of everything already queued.
    pub fn push_head(&self, item: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.push_front(item);
        self.not_empty.notify_one();
    }

    /// Block until an item is available or the queue is closed.
    ///
    /// Returns `None` only once the queue has been closed and drained.
    pub fn pop_head(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Non-blocking pop, used by tests and by callers that poll instead of
    /// dedicating a thread to this queue.
    pub fn try_pop_head(&self) -> Option<T> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Close the queue. Already-enqueued items are still delivered by
    /// `pop_head`; once drained, every subsequent `pop_head` returns `None`
    /// promptly. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}
