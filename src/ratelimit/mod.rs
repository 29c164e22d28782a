//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod leak;
mod lru;
mod rate;
mod store;

pub use backend::TokenBucketStore;
pub use bucket::Bucket;
pub use leak::{LeakHandle, LeakScheduler};
pub use rate::Rate;
pub use store::{BucketStore, LeakReport, TakeOutcome, DEFAULT_MAX_KEYS};
