//! Dead letter storage for items that exhausted their retry budget.
//!
//! - Chronological ordering (insert order), oldest evicted first
//! - Lookup and removal by id in O(1)
//! - Simple pagination (offset/limit), most recent first

use hashlink::LinkedHashMap;
use serde::{Deserialize, Serialize};
use crate::queue::types::{ItemId, QueueItem};
use crate::utils::utils_time::current_time_ms;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter<P> {
    pub item: QueueItem<P>,
    pub failed_at: u64,
    pub failure_reason: String,
}

impl<P> DeadLetter<P> {
    pub fn new(item: QueueItem<P>, reason: String) -> Self {
        Self {
            item,
            failed_at: current_time_ms(),
            failure_reason: reason,
        }
    }
}

pub struct DlqState<P> {
    entries: LinkedHashMap<ItemId, DeadLetter<P>>,
}

impl<P: Clone> DlqState<P> {
    pub fn new() -> Self {
        Self {
            entries: LinkedHashMap::new(),
        }
    }

    /// Appends `entry`, then evicts from the front until at most `capacity` remain.
    /// Returns the evicted entries. With `capacity == 0` the entry itself is evicted.
    pub fn push(&mut self, entry: DeadLetter<P>, capacity: usize) -> Vec<DeadLetter<P>> {
        self.entries.insert(entry.item.id.clone(), entry);

        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            match self.entries.pop_front() {
                Some((_, old)) => evicted.push(old),
                None => break,
            }
        }
        evicted
    }

    pub fn get(&self, id: &ItemId) -> Option<&DeadLetter<P>> {
        self.entries.get(id)
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<DeadLetter<P>> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn items(&self) -> Vec<DeadLetter<P>> {
        self.entries.values().cloned().collect()
    }

    /// Returns (total_count, page), most recent failure first.
    pub fn peek(&self, offset: usize, limit: usize) -> (usize, Vec<DeadLetter<P>>) {
        let total = self.entries.len();

        let items = self.entries.values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        (total, items)
    }
}
