//! Bounded per-key usage counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Units consumed by one key during the current leak cycle.
///
/// The counter is a lock-free bounded semaphore: `try_acquire` and
/// `try_release` never block and never move the fill outside
/// `0..=capacity`, so callers may use a bucket after dropping the store lock.
#[derive(Debug)]
pub struct Bucket {
    /// Units consumed so far
    fill: AtomicU64,
    /// Upper bound for `fill`
    capacity: u64,
}

impl Bucket {
    /// Create an empty bucket.
    pub fn new(capacity: u64) -> Self {
        Self {
            fill: AtomicU64::new(0),
            capacity,
        }
    }

    /// Consume one unit if the bucket is not full.
    ///
    /// Returns the remaining capacity after the consume, or `None` when full.
    pub fn try_acquire(&self) -> Option<u64> {
        self.fill
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |fill| {
                (fill < self.capacity).then_some(fill + 1)
            })
            .ok()
            .map(|previous| self.capacity - (previous + 1))
    }

    /// Reclaim one unit. Returns `false` if the bucket was already empty.
    pub fn try_release(&self) -> bool {
        self.fill
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |fill| {
                fill.checked_sub(1)
            })
            .is_ok()
    }

    /// Current number of consumed units.
    pub fn fill(&self) -> u64 {
        self.fill.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.fill())
    }
}
