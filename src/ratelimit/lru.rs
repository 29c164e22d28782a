//! Insertion-ordered key tracking used to bound the store.

use std::collections::BTreeMap;

/// Keys in the order they were first inserted.
///
/// Each key gets a monotonically increasing sequence number, so the oldest
/// key is the first map entry and any key can be dropped by its sequence
/// number when its bucket is deleted elsewhere.
#[derive(Debug, Default)]
pub(crate) struct InsertionOrder {
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl InsertionOrder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a key at the tail, returning its sequence number.
    pub(crate) fn push_back(&mut self, key: String) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key);
        seq
    }

    /// Remove and return the oldest key.
    pub(crate) fn pop_front(&mut self) -> Option<String> {
        self.order.pop_first().map(|(_, key)| key)
    }

    /// Remove the entry with the given sequence number.
    pub(crate) fn remove(&mut self, seq: u64) -> Option<String> {
        self.order.remove(&seq)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Keys from oldest to newest.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
    }
}
