//! Lazily invalidated merge queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A candidate merge of two live nodes.
///
/// `versions` snapshots the node versions at push time; the entry is stale
/// once either node has changed.
#[derive(Debug, Clone, Copy)]
pub struct QueueEntry {
    pub priority: f64,
    pub a: u64,
    pub b: u64,
    pub versions: (u64, u64),
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Reversed so that `BinaryHeap` pops the lowest priority first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.a.cmp(&self.a))
            .then_with(|| other.b.cmp(&self.b))
    }
}

/// Min-priority queue of merge candidates.
#[derive(Debug, Clone, Default)]
pub struct MergeQueue {
    heap: BinaryHeap<QueueEntry>,
}

impl MergeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueueEntry) {
        self.heap.push(entry);
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
