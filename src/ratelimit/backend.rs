//! Store trait for abstracting bucket store implementations.

use std::sync::Arc;

use super::store::{BucketStore, TakeOutcome};
use crate::error::Result;

/// Trait for token bucket store implementations.
///
/// Callers that only need admission decisions depend on this trait rather
/// than on [`BucketStore`], so another backing store can slot in later. The
/// error slot exists for such stores; the in-memory one never fails.
pub trait TokenBucketStore: Send + Sync {
    /// Take one unit from the bucket referenced by `key`, if available.
    fn take(&self, key: &str) -> Result<TakeOutcome>;
}

impl TokenBucketStore for BucketStore {
    fn take(&self, key: &str) -> Result<TakeOutcome> {
        BucketStore::take(self, key)
    }
}

impl<S: TokenBucketStore + ?Sized> TokenBucketStore for Arc<S> {
    fn take(&self, key: &str) -> Result<TakeOutcome> {
        (**self).take(key)
    }
}
