// src/engine/queue.rs

use std::collections::VecDeque;

use super::Priority;

/// Anything that can sit in the pending queue.
pub trait Prioritized {
    fn priority(&self) -> Priority;
}

/// Pending work, ordered by priority.
///
/// Ordering rules:
/// - higher priority first
/// - among equal priorities, insertion order (FIFO)
///
/// A new item is inserted just before the first item of strictly lower
/// priority, so it never overtakes an equal-priority item already queued.
#[derive(Debug)]
pub struct PendingQueue<I> {
    items: VecDeque<I>,
}

impl<I> Default for PendingQueue<I> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<I: Prioritized> PendingQueue<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert `item` at its priority position and return that position.
    pub fn push(&mut self, item: I) -> usize {
        let priority = item.priority();
        let index = self
            .items
            .iter()
            .position(|queued| queued.priority() < priority)
            .unwrap_or(self.items.len());
        self.items.insert(index, item);
        index
    }

    /// Take the highest-priority, oldest item.
    pub fn pop(&mut self) -> Option<I> {
        self.items.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &I> {
        self.items.iter()
    }

    pub fn find_mut(&mut self, mut pred: impl FnMut(&I) -> bool) -> Option<&mut I> {
        self.items.iter_mut().find(|item| pred(item))
    }

    pub fn contains(&self, mut pred: impl FnMut(&I) -> bool) -> bool {
        self.items.iter().any(|item| pred(item))
    }

    /// Remove every item matching `pred`, keeping the rest in order.
    /// Removed items are returned in queue order.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&I) -> bool) -> Vec<I> {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if pred(&item) {
                removed.push(item);
            } else {
                kept.push_back(item);
            }
        }
        self.items = kept;
        removed
    }

    /// Remove everything, in queue order.
    pub fn drain_all(&mut self) -> Vec<I> {
        self.items.drain(..).collect()
    }
}
