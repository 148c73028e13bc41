//! Bounded in-memory FIFO queues owned solely by the runner. They exist to
//! serve the Query API on the hot read path without touching persistence.
//!
//! Single owner, no globals: the runner holds these; nothing else mutates
//! them directly (the re-architecture this crate's teacher predecessor
//! used a shared mutable `deque` for, here replaced with an explicit
//! owner threaded through `AppState`).

use std::collections::VecDeque;

/// A fixed-capacity FIFO. On overflow the oldest entry is evicted before
/// the new one is inserted (tail-drop-head), never exceeding `cap`.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    cap: usize,
    items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            items: VecDeque::with_capacity(cap),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Most recent `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().rev().take(n).cloned().collect()
    }
}
