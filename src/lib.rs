//! Keybucket - In-process Leaky Token Bucket Rate Limiting
//!
//! This crate implements a bounded, concurrency-safe store mapping caller
//! supplied keys to token buckets. A background leak task periodically
//! reclaims consumed capacity and deletes idle buckets, while an
//! insertion-ordered tracker caps the number of keys held in memory.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{KeybucketError, Result};
pub use ratelimit::{
    BucketStore, LeakHandle, LeakReport, LeakScheduler, Rate, TakeOutcome, TokenBucketStore,
};
