//! Immutable rate configuration.

use std::time::Duration;

use crate::error::{KeybucketError, Result};

/// How many units a key may consume per window.
///
/// A `Rate` is validated once and then shared by value. The leak interval
/// (`window / rate`) is derived up front so a rate that cannot produce a
/// positive interval is rejected here instead of faulting later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    rate: u32,
    window: Duration,
    leak_interval: Duration,
}

impl Rate {
    /// Create a rate of `rate` units per `window`.
    pub fn new(rate: u32, window: Duration) -> Result<Self> {
        if rate == 0 {
            return Err(KeybucketError::InvalidRate { rate, window });
        }

        let leak_interval = window / rate;
        if leak_interval.is_zero() {
            return Err(KeybucketError::InvalidRate { rate, window });
        }

        Ok(Self {
            rate,
            window,
            leak_interval,
        })
    }

    /// Maximum units per window; also the capacity of every bucket.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// The window the rate applies to.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Time between leak ticks, `window / rate`.
    pub fn leak_interval(&self) -> Duration {
        self.leak_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leak_interval() {
        let rate = Rate::new(4, Duration::from_secs(2)).unwrap();
        assert_eq!(rate.rate(), 4);
        assert_eq!(rate.window(), Duration::from_secs(2));
        assert_eq!(rate.leak_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let err = Rate::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, KeybucketError::InvalidRate { rate: 0, .. }));
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(Rate::new(10, Duration::ZERO).is_err());
    }

    #[test]
    fn test_window_shorter_than_rate_rejected() {
        // 3ns / 5 rounds down to a zero interval
        assert!(Rate::new(5, Duration::from_nanos(3)).is_err());
        assert!(Rate::new(5, Duration::from_nanos(5)).is_ok());
    }
}
