//! Injectable time and sleep primitives.
//!
//! Every statistics structure and controller consults a [`Clock`] instead of
//! the system time directly, and every queueing controller suspends through a
//! [`Sleeper`]. Production engines run on [`SystemClock`] and
//! [`SystemSleeper`]; the test suite swaps in [`ManualClock`] and
//! [`ManualSleeper`] so scenarios never perform a real wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Millisecond wall-clock source.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Blocking sleep primitive used by the queueing controllers.
///
/// The contract is to sleep for the full duration; there is no partial or
/// interrupted wake-up in this model.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Default clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Default sleeper that parks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSleeper;

impl Sleeper for SystemSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Advance the clock by `delta_ms` and return the new time.
    pub fn advance(&self, delta_ms: u64) -> u64 {
        self.now_ms.fetch_add(delta_ms, Ordering::AcqRel) + delta_ms
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }
}

/// Sleeper that advances a [`ManualClock`] instead of blocking.
///
/// Records every requested sleep so tests can assert on wait durations.
pub struct ManualSleeper {
    clock: Arc<ManualClock>,
    slept: Mutex<Vec<u64>>,
}

impl ManualSleeper {
    #[must_use]
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            slept: Mutex::new(Vec::new()),
        }
    }

    /// All sleep durations requested so far, in milliseconds.
    #[must_use]
    pub fn recorded(&self) -> Vec<u64> {
        self.slept.lock().clone()
    }
}

impl Sleeper for ManualSleeper {
    fn sleep(&self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.clock.advance(ms);
        self.slept.lock().push(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        assert_eq!(clock.advance(250), 1_250);
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[test]
    fn manual_sleeper_moves_the_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let sleeper = ManualSleeper::new(Arc::clone(&clock));
        sleeper.sleep(Duration::from_millis(120));
        assert_eq!(clock.now_ms(), 120);
        assert_eq!(sleeper.recorded(), vec![120]);
    }
}
