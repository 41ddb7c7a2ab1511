//! Time source abstraction for the rate limiter.
//!
//! The limiter never reads wall-clock time directly: it takes a [`Clock`]
//! so that production code runs on a monotonic source while tests drive
//! time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Non-decreasing time source measured in whole seconds.
pub trait Clock: Send + Sync {
    /// Current time in seconds. Must never decrease across calls.
    fn now_secs(&self) -> u64;
}

/// Production clock anchored to a [`Instant`] taken at construction.
///
/// Reports elapsed whole seconds since the anchor, so it is immune to
/// wall-clock adjustments (NTP steps, manual changes).
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_secs(&self) -> u64 {
        self.origin.elapsed().as_secs()
    }
}

/// Manually driven clock for deterministic tests.
///
/// # Examples
///
/// ```
/// use media_fetch_bot::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new(100);
/// assert_eq!(clock.now_secs(), 100);
/// clock.advance(30);
/// assert_eq!(clock.now_secs(), 130);
/// ```
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start` seconds.
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Set the absolute time. Callers are responsible for keeping it
    /// non-decreasing, matching the [`Clock`] contract.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_non_decreasing() {
        let clock = MonotonicClock::new();
        let a = clock.now_secs();
        let b = clock.now_secs();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new(0);
        assert_eq!(clock.now_secs(), 0);
        clock.set(42);
        assert_eq!(clock.now_secs(), 42);
        clock.advance(8);
        assert_eq!(clock.now_secs(), 50);
    }
}
