//! Uniform pacing through a virtual queue.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::flow::controller::ShapingOutcome;
use crate::time::{Clock, Sleeper};

/// Leaky bucket: requests are spaced `1000 / count` ms apart. A request that
/// would be early queues (sleeps) up to `max_queueing_time_ms`, anything
/// later is rejected.
pub struct RateLimiterController {
    count: f64,
    max_queueing_time_ms: u64,
    /// When the latest admitted request passed, total order through CAS.
    latest_passed_ms: AtomicI64,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimiterController {
    #[must_use]
    pub fn new(
        count: f64,
        max_queueing_time_ms: u64,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            count,
            max_queueing_time_ms,
            latest_passed_ms: AtomicI64::new(-1),
            clock,
            sleeper,
        }
    }

    pub fn can_pass(&self, acquire: u32) -> ShapingOutcome {
        if acquire == 0 {
            return ShapingOutcome::Pass;
        }
        // A non-positive threshold would make the spacing unbounded.
        if self.count <= 0.0 {
            return ShapingOutcome::Reject;
        }

        let now = self.clock.now_ms() as i64;
        let cost_ms = (f64::from(acquire) / self.count * 1_000.0).round() as i64;
        let max_queueing = self.max_queueing_time_ms as i64;

        let expected = self.latest_passed_ms.load(Ordering::Acquire) + cost_ms;
        if expected <= now {
            // Contention here may let a burst through one spacing early,
            // which the next admission absorbs.
            self.latest_passed_ms.store(now, Ordering::Release);
            return ShapingOutcome::Pass;
        }

        let wait = self.latest_passed_ms.load(Ordering::Acquire) + cost_ms
            - self.clock.now_ms() as i64;
        if wait > max_queueing {
            return ShapingOutcome::Reject;
        }

        let slot = self.latest_passed_ms.fetch_add(cost_ms, Ordering::AcqRel) + cost_ms;
        let wait = slot - self.clock.now_ms() as i64;
        if wait > max_queueing {
            // Give the queue slot back.
            self.latest_passed_ms.fetch_sub(cost_ms, Ordering::AcqRel);
            return ShapingOutcome::Reject;
        }
        if wait > 0 {
            self.sleeper.sleep(Duration::from_millis(wait as u64));
        }
        ShapingOutcome::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{ManualClock, ManualSleeper};

    fn controller(count: f64, max_queueing_ms: u64) -> (Arc<ManualClock>, Arc<ManualSleeper>, RateLimiterController) {
        let clock = Arc::new(ManualClock::new(100_000));
        let sleeper = Arc::new(ManualSleeper::new(Arc::clone(&clock)));
        let c = RateLimiterController::new(
            count,
            max_queueing_ms,
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::clone(&sleeper) as Arc<dyn Sleeper>,
        );
        (clock, sleeper, c)
    }

    #[test]
    fn spaces_admissions_evenly() {
        let (clock, _sleeper, c) = controller(10.0, 500);
        // First request passes immediately.
        assert_eq!(c.can_pass(1), ShapingOutcome::Pass);
        assert_eq!(clock.now_ms(), 100_000);

        // Each subsequent instantaneous request queues 100 ms further out.
        for i in 1..=5 {
            assert_eq!(c.can_pass(1), ShapingOutcome::Pass);
            assert_eq!(clock.now_ms(), 100_000 + i * 100);
        }
    }

    #[test]
    fn rejects_when_projected_wait_exceeds_the_queue_bound() {
        let (clock, _sleeper, c) = controller(10.0, 500);
        for _ in 0..6 {
            assert_eq!(c.can_pass(1), ShapingOutcome::Pass);
        }
        // Rewind to the burst instant, as if the seventh arrived on another
        // thread at t=0: its projected wait is 600 ms and does not fit.
        clock.set(100_000);
        assert_eq!(c.can_pass(1), ShapingOutcome::Reject);
    }

    #[test]
    fn zero_acquire_always_passes_and_zero_count_always_rejects() {
        let (_clock, _sleeper, c) = controller(10.0, 500);
        assert_eq!(c.can_pass(0), ShapingOutcome::Pass);

        let (_clock, _sleeper, zero) = controller(0.0, 500);
        assert_eq!(zero.can_pass(1), ShapingOutcome::Reject);
    }

    #[test]
    fn spaced_arrivals_never_wait() {
        let (clock, sleeper, c) = controller(10.0, 500);
        for _ in 0..3 {
            assert_eq!(c.can_pass(1), ShapingOutcome::Pass);
            clock.advance(100);
        }
        assert!(sleeper.recorded().is_empty());
    }
}
