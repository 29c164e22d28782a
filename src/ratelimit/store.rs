//! In-memory bucket store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use super::bucket::Bucket;
use super::lru::InsertionOrder;
use super::rate::Rate;
use crate::error::{KeybucketError, Result};

/// Default bound on the number of tracked keys.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Result of a single take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TakeOutcome {
    /// Whether the unit was granted
    pub allowed: bool,
    /// Units left in the bucket after this take (0 when denied)
    pub remaining: u64,
    /// Coarse time at which the next leak tick is expected
    pub reset_at: DateTime<Utc>,
}

/// Summary of one leak sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakReport {
    /// Buckets that gave back one unit
    pub leaked: usize,
    /// Idle buckets deleted
    pub removed: usize,
    /// Keys still tracked after the sweep
    pub tracked: usize,
}

struct Entry {
    bucket: Arc<Bucket>,
    /// Position in the insertion order
    seq: u64,
}

/// Everything guarded by the store lock. `buckets` and `order` always hold
/// the same key set.
struct StoreState {
    buckets: HashMap<String, Entry>,
    order: InsertionOrder,
    reset_at: DateTime<Utc>,
}

impl StoreState {
    fn evict_oldest(&mut self) -> Option<String> {
        let key = self.order.pop_front()?;
        self.buckets.remove(&key);
        Some(key)
    }
}

/// A bounded map from key to token bucket.
///
/// This struct is thread-safe and can be shared across threads and tasks.
/// Structural changes (insert, evict, leak sweep) happen under one mutex;
/// consuming from a bucket happens after the lock is released.
pub struct BucketStore {
    state: Mutex<StoreState>,
    rate: Rate,
    max_keys: usize,
}

impl BucketStore {
    /// Create a store tracking at most [`DEFAULT_MAX_KEYS`] keys.
    pub fn new(rate: Rate) -> Self {
        Self::bounded(rate, DEFAULT_MAX_KEYS)
    }

    /// Create a store tracking at most `max_keys` keys.
    pub fn with_max_keys(rate: Rate, max_keys: usize) -> Result<Self> {
        if max_keys == 0 {
            return Err(KeybucketError::InvalidMaxKeys);
        }
        Ok(Self::bounded(rate, max_keys))
    }

    fn bounded(rate: Rate, max_keys: usize) -> Self {
        Self {
            state: Mutex::new(StoreState {
                buckets: HashMap::new(),
                order: InsertionOrder::new(),
                reset_at: Utc::now(),
            }),
            rate,
            max_keys,
        }
    }

    /// Try to consume one unit for `key`.
    ///
    /// Creates the bucket on first use. When a new key would push the store
    /// past its bound, the oldest inserted key is evicted first. The
    /// in-memory store never returns an error.
    pub fn take(&self, key: &str) -> Result<TakeOutcome> {
        let (bucket, reset_at) = {
            let mut state = self.state.lock();

            let bucket = match state.buckets.get(key) {
                Some(entry) => Arc::clone(&entry.bucket),
                None => {
                    if state.buckets.len() >= self.max_keys {
                        if let Some(evicted) = state.evict_oldest() {
                            debug!(
                                evicted = %evicted,
                                max_keys = self.max_keys,
                                "Evicted oldest key"
                            );
                        }
                    }

                    debug!(
                        key = %key,
                        capacity = self.rate.rate(),
                        "Creating new bucket"
                    );
                    let bucket = Arc::new(Bucket::new(u64::from(self.rate.rate())));
                    let seq = state.order.push_back(key.to_owned());
                    state.buckets.insert(
                        key.to_owned(),
                        Entry {
                            bucket: Arc::clone(&bucket),
                            seq,
                        },
                    );
                    bucket
                }
            };

            (bucket, state.reset_at)
        };

        let outcome = match bucket.try_acquire() {
            Some(remaining) => TakeOutcome {
                allowed: true,
                remaining,
                reset_at,
            },
            None => {
                debug!(key = %key, "Rate limit exceeded");
                TakeOutcome {
                    allowed: false,
                    remaining: 0,
                    reset_at,
                }
            }
        };

        trace!(
            key = %key,
            allowed = outcome.allowed,
            remaining = outcome.remaining,
            "Take"
        );

        Ok(outcome)
    }

    /// Run one leak sweep stamped with the current time.
    ///
    /// This is what every scheduler tick does.
    pub fn leak(&self) -> LeakReport {
        self.leak_at(Utc::now())
    }

    /// Run one leak sweep as if the tick fired at `now`.
    ///
    /// Moves the shared reset time to `now + leak_interval`, reclaims one unit
    /// from every non-empty bucket and deletes every bucket that was already
    /// empty.
    pub fn leak_at(&self, now: DateTime<Utc>) -> LeakReport {
        let mut state = self.state.lock();
        let StoreState {
            buckets,
            order,
            reset_at,
        } = &mut *state;

        *reset_at = chrono::Duration::from_std(self.rate.leak_interval())
            .ok()
            .and_then(|interval| now.checked_add_signed(interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut report = LeakReport::default();
        buckets.retain(|_, entry| {
            if entry.bucket.try_release() {
                report.leaked += 1;
                true
            } else {
                order.remove(entry.seq);
                report.removed += 1;
                false
            }
        });
        report.tracked = buckets.len();
        debug_assert_eq!(report.tracked, order.len());

        report
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.state.lock().buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// The shared, coarse reset time handed out by every take.
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.state.lock().reset_at
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().buckets.contains_key(key)
    }

    /// Units currently consumed by `key`, if it is tracked.
    pub fn fill(&self, key: &str) -> Option<u64> {
        self.state
            .lock()
            .buckets
            .get(key)
            .map(|entry| entry.bucket.fill())
    }

    /// Tracked keys from oldest to newest insertion.
    pub fn tracked_keys(&self) -> Vec<String> {
        self.state.lock().order.iter().map(str::to_owned).collect()
    }

    /// Drop every bucket.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.buckets.clear();
        state.order.clear();
    }
}

impl std::fmt::Debug for BucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketStore")
            .field("rate", &self.rate)
            .field("max_keys", &self.max_keys)
            .field("tracked", &self.len())
            .finish()
    }
}
