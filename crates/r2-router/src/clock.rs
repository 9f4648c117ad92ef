//! Monotonic millisecond time.
//!
//! Every deadline in the router (serial byte timeout, mesh reply wait, sleep
//! pause) is computed from a [`Clock`]. Hardware nodes use [`StdClock`]; tests
//! use [`ManualClock`], which advances by a fixed step every time it is read
//! so that polling loops always reach their deadline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic millisecond clock with a blocking delay.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin.
    fn millis(&self) -> u64;

    /// Block for `ms` milliseconds.
    fn delay_ms(&self, ms: u64);
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    /// Create a clock whose origin is now.
    pub fn new() -> Self {
        StdClock {
            origin: Instant::now(),
        }
    }

    /// Create a shared handle to a new clock.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn delay_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Deterministic clock for tests.
///
/// Clones share the same time. Each call to [`Clock::millis`] returns the
/// current time and then advances it by `step` milliseconds; [`Clock::delay_ms`]
/// advances it without blocking.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
    step: u64,
}

impl ManualClock {
    /// Create a clock at time zero advancing 1 ms per read.
    pub fn new() -> Self {
        Self::with_step(1)
    }

    /// Create a clock at time zero advancing `step` ms per read.
    pub fn with_step(step: u64) -> Self {
        ManualClock {
            now: Arc::new(AtomicU64::new(0)),
            step,
        }
    }

    /// Current time without advancing.
    pub fn peek(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    /// Move time forward.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Shared handle to this clock.
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }

    fn delay_ms(&self, ms: u64) {
        self.advance(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_auto_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.millis(), 0);
        assert_eq!(clock.millis(), 1);
        clock.delay_ms(100);
        assert_eq!(clock.peek(), 102);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::with_step(0);
        let shared = clock.shared();
        clock.advance(42);
        assert_eq!(shared.millis(), 42);
        assert_eq!(shared.millis(), 42);
    }

    #[test]
    fn test_std_clock_is_monotonic() {
        let clock = StdClock::new();
        let a = clock.millis();
        let b = clock.millis();
        assert!(b >= a);
    }
}
