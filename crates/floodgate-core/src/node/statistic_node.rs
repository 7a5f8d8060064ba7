//! Per-resource runtime statistics.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::node::metric_node::MetricNode;
use crate::stat::{MetricEvent, SlidingMetric};
use crate::time::Clock;

const MINUTE_SAMPLE_COUNT: usize = 60;
const MINUTE_INTERVAL_MS: u64 = 60_000;

/// Holds real-time statistics for one resource: a second-level window with
/// future-occupancy support, a minute-level window for totals, and the
/// current concurrency gauge.
pub struct StatisticNode {
    second: SlidingMetric,
    minute: SlidingMetric,
    concurrency: AtomicU32,
    /// Latest future window start pledged through priority occupancy.
    /// Advances monotonically.
    last_occupied_ms: AtomicU64,
    /// Serialises the scan-then-pledge of priority occupancy so concurrent
    /// occupants cannot over-commit a future window.
    occupy_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl StatisticNode {
    #[must_use]
    pub fn new(sample_count: usize, interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            second: SlidingMetric::with_future_occupancy(sample_count, interval_ms),
            minute: SlidingMetric::new(MINUTE_SAMPLE_COUNT, MINUTE_INTERVAL_MS),
            concurrency: AtomicU32::new(0),
            last_occupied_ms: AtomicU64::new(0),
            occupy_lock: Mutex::new(()),
            clock,
        }
    }

    // ── Recording ────────────────────────────────────────────────────────

    pub fn add_pass_request(&self, n: u32) {
        let now = self.clock.now_ms();
        self.second.add(MetricEvent::Pass, u64::from(n), now);
        self.minute.add(MetricEvent::Pass, u64::from(n), now);
    }

    pub fn add_rt_and_success(&self, rt_ms: u64, n: u32) {
        let now = self.clock.now_ms();
        self.second.add(MetricEvent::Success, u64::from(n), now);
        self.second.add_rt(rt_ms, now);
        self.minute.add(MetricEvent::Success, u64::from(n), now);
        self.minute.add_rt(rt_ms, now);
    }

    pub fn increase_block(&self, n: u32) {
        let now = self.clock.now_ms();
        self.second.add(MetricEvent::Block, u64::from(n), now);
        self.minute.add(MetricEvent::Block, u64::from(n), now);
    }

    pub fn increase_exception(&self, n: u32) {
        let now = self.clock.now_ms();
        self.second.add(MetricEvent::Exception, u64::from(n), now);
        self.minute.add(MetricEvent::Exception, u64::from(n), now);
    }

    pub fn increase_thread_num(&self) {
        self.concurrency.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrease_thread_num(&self) {
        let _ = self
            .concurrency
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
    }

    // ── Aggregates ───────────────────────────────────────────────────────

    #[must_use]
    pub fn cur_thread_num(&self) -> u32 {
        self.concurrency.load(Ordering::Acquire)
    }

    /// Admitted QPS over the second window, pre-paid future admissions
    /// included so they weigh against thresholds.
    #[must_use]
    pub fn pass_qps(&self) -> f64 {
        self.second.pass_with_occupied(self.clock.now_ms()) as f64 / self.second.interval_sec()
    }

    #[must_use]
    pub fn block_qps(&self) -> f64 {
        self.per_second(MetricEvent::Block)
    }

    #[must_use]
    pub fn total_qps(&self) -> f64 {
        self.pass_qps() + self.block_qps()
    }

    #[must_use]
    pub fn success_qps(&self) -> f64 {
        self.per_second(MetricEvent::Success)
    }

    #[must_use]
    pub fn exception_qps(&self) -> f64 {
        self.per_second(MetricEvent::Exception)
    }

    #[must_use]
    pub fn occupied_pass_qps(&self) -> f64 {
        self.per_second(MetricEvent::OccupiedPass)
    }

    /// Pass rate of the previous full minute-level bucket. Steadier than
    /// [`pass_qps`](Self::pass_qps) right after a window turn, which is what
    /// refill gating needs.
    #[must_use]
    pub fn previous_pass_qps(&self) -> f64 {
        let now = self.clock.now_ms();
        let prev = now.saturating_sub(self.minute.window_length_ms());
        self.minute.window_event_at(MetricEvent::Pass, prev) as f64
    }

    /// Average response time per completed request over the second window.
    #[must_use]
    pub fn avg_rt(&self) -> f64 {
        let now = self.clock.now_ms();
        let success = self.second.count(MetricEvent::Success, now);
        if success == 0 {
            return 0.0;
        }
        self.second.count(MetricEvent::Rt, now) as f64 / success as f64
    }

    #[must_use]
    pub fn min_rt(&self) -> u64 {
        self.second.min_rt_ms(self.clock.now_ms()).unwrap_or(0)
    }

    fn per_second(&self, event: MetricEvent) -> f64 {
        self.second.count(event, self.clock.now_ms()) as f64 / self.second.interval_sec()
    }

    // ── Minute totals ────────────────────────────────────────────────────

    /// Incoming requests per minute, `pass + block`.
    #[must_use]
    pub fn total_request(&self) -> u64 {
        self.total_pass() + self.block_request()
    }

    #[must_use]
    pub fn total_pass(&self) -> u64 {
        self.minute.count(MetricEvent::Pass, self.clock.now_ms())
    }

    #[must_use]
    pub fn total_success(&self) -> u64 {
        self.minute.count(MetricEvent::Success, self.clock.now_ms())
    }

    #[must_use]
    pub fn block_request(&self) -> u64 {
        self.minute.count(MetricEvent::Block, self.clock.now_ms())
    }

    #[must_use]
    pub fn total_exception(&self) -> u64 {
        self.minute.count(MetricEvent::Exception, self.clock.now_ms())
    }

    // ── Future-window occupancy ──────────────────────────────────────────

    /// Pass currently pledged against future windows.
    #[must_use]
    pub fn waiting(&self) -> u64 {
        self.second.waiting(self.clock.now_ms())
    }

    /// Smallest wait after which the window at `current_ms + wait` can absorb
    /// `acquire` more pass without the interval exceeding `threshold`.
    /// `None` when no window within `occupy_timeout_ms` can.
    #[must_use]
    pub fn try_occupy_next(
        &self,
        current_ms: u64,
        acquire: u32,
        threshold: f64,
        occupy_timeout_ms: u64,
    ) -> Option<u64> {
        let max_count = threshold * self.second.interval_sec();
        let current_borrow = self.waiting() as f64;
        if current_borrow >= max_count {
            return None;
        }

        let window_length = self.second.window_length_ms();
        let interval = self.second.interval_ms();
        // Start of the oldest window in the current interval; may be negative
        // shortly after the epoch.
        let mut earliest = (current_ms - current_ms % window_length + window_length) as i64
            - interval as i64;
        let mut current_pass = self.second.pass_with_occupied(current_ms) as f64;
        let mut idx: u64 = 0;

        while earliest < current_ms as i64 {
            let wait = idx * window_length + window_length - current_ms % window_length;
            if wait >= occupy_timeout_ms {
                break;
            }
            // Sliding one window forward retires the pass recorded in the
            // oldest bucket of the interval.
            let retiring = u64::try_from(earliest)
                .ok()
                .map_or(0.0, |t| self.second.window_pass_at(t) as f64);
            if current_pass + current_borrow + f64::from(acquire) - retiring <= max_count {
                return Some(wait);
            }
            earliest += window_length as i64;
            current_pass -= retiring;
            idx += 1;
        }
        None
    }

    /// Scan-and-pledge under the occupancy lock: on success the future window
    /// is already charged and the returned wait is how long the caller must
    /// sleep before proceeding.
    #[must_use]
    pub fn occupy_next(
        &self,
        current_ms: u64,
        acquire: u32,
        threshold: f64,
        occupy_timeout_ms: u64,
    ) -> Option<u64> {
        let _guard = self.occupy_lock.lock();
        let wait = self.try_occupy_next(current_ms, acquire, threshold, occupy_timeout_ms)?;
        self.add_waiting_request(current_ms + wait, acquire);
        Some(wait)
    }

    /// Pledge `acquire` pass against the future window covering `future_ms`.
    pub fn add_waiting_request(&self, future_ms: u64, acquire: u32) {
        self.second.add_waiting(future_ms, u64::from(acquire));
        self.last_occupied_ms.fetch_max(future_ms, Ordering::AcqRel);
    }

    /// Record pre-paid pass in the minute totals at pledge time, so minute
    /// aggregates see the admission exactly once.
    pub fn add_occupied_pass(&self, acquire: u32) {
        let now = self.clock.now_ms();
        self.minute.add(MetricEvent::Pass, u64::from(acquire), now);
        self.minute.add(MetricEvent::OccupiedPass, u64::from(acquire), now);
    }

    #[must_use]
    pub fn last_occupied_ms(&self) -> u64 {
        self.last_occupied_ms.load(Ordering::Acquire)
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    /// Render the live minute-level buckets as metric snapshots, oldest
    /// first.
    #[must_use]
    pub fn metric_nodes(&self, resource: &str) -> Vec<MetricNode> {
        let now = self.clock.now_ms();
        let concurrency = self.cur_thread_num();
        let mut nodes: Vec<MetricNode> = self
            .minute
            .live_windows(now)
            .map(|w| {
                let bucket = w.bucket();
                let success = bucket.get(MetricEvent::Success);
                let avg_rt_ms = if success == 0 {
                    0
                } else {
                    bucket.get(MetricEvent::Rt) / success
                };
                MetricNode {
                    timestamp_ms: w.start_ms(),
                    resource: resource.to_owned(),
                    pass_qps: bucket.get(MetricEvent::Pass),
                    block_qps: bucket.get(MetricEvent::Block),
                    success_qps: success,
                    exception_qps: bucket.get(MetricEvent::Exception),
                    avg_rt_ms,
                    concurrency,
                }
            })
            .collect();
        nodes.sort_by_key(|n| n.timestamp_ms);
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn node_at(start_ms: u64) -> (Arc<ManualClock>, StatisticNode) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let node = StatisticNode::new(2, 1_000, Arc::clone(&clock) as Arc<dyn Clock>);
        (clock, node)
    }

    #[test]
    fn pass_and_block_feed_both_windows() {
        let (_clock, node) = node_at(10_000);
        node.add_pass_request(3);
        node.increase_block(2);

        assert!((node.pass_qps() - 3.0).abs() < f64::EPSILON);
        assert!((node.block_qps() - 2.0).abs() < f64::EPSILON);
        assert!((node.total_qps() - 5.0).abs() < f64::EPSILON);
        assert_eq!(node.total_pass(), 3);
        assert_eq!(node.block_request(), 2);
        assert_eq!(node.total_request(), 5);
    }

    #[test]
    fn rt_and_success_aggregate() {
        let (_clock, node) = node_at(10_000);
        node.add_rt_and_success(30, 1);
        node.add_rt_and_success(10, 1);
        assert!((node.avg_rt() - 20.0).abs() < f64::EPSILON);
        assert_eq!(node.min_rt(), 10);
        assert!((node.success_qps() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrency_gauge_never_underflows() {
        let (_clock, node) = node_at(0);
        node.increase_thread_num();
        node.decrease_thread_num();
        node.decrease_thread_num();
        assert_eq!(node.cur_thread_num(), 0);
    }

    #[test]
    fn occupy_next_waits_until_the_filled_bucket_retires() {
        let (clock, node) = node_at(10_100);
        // Five passes land in the bucket starting at 10_000.
        node.add_pass_request(5);
        clock.advance(500);

        // At 10_600 the interval still carries those five; admitting one more
        // only works once the 10_000 bucket slides out, at 11_000.
        let wait = node.occupy_next(10_600, 1, 5.0, 500).expect("occupiable");
        assert_eq!(wait, 400);
        assert_eq!(node.waiting(), 1);
        assert_eq!(node.last_occupied_ms(), 11_000);
    }

    #[test]
    fn occupy_next_refuses_when_the_filled_bucket_stays_live() {
        let (_clock, node) = node_at(10_100);
        // All five passes sit in the current bucket; every window reachable
        // within the timeout still counts them.
        node.add_pass_request(5);
        assert_eq!(node.occupy_next(10_100, 1, 5.0, 500), None);
    }

    #[test]
    fn occupy_next_refuses_when_horizon_is_saturated() {
        let (clock, node) = node_at(10_100);
        node.add_pass_request(5);
        clock.advance(500);
        // The pledge budget for the interval is exhausted.
        node.add_waiting_request(11_000, 5);
        assert_eq!(node.occupy_next(10_600, 1, 5.0, 500), None);
    }

    #[test]
    fn occupied_pass_counts_against_pass_qps_after_the_turn() {
        let (clock, node) = node_at(10_100);
        node.add_pass_request(5);
        clock.advance(500);
        let wait = node.occupy_next(10_600, 1, 5.0, 500).expect("occupiable");
        node.add_occupied_pass(1);
        clock.advance(wait);

        // Trigger the window turn, then the occupied pass must weigh in.
        node.add_pass_request(0);
        assert!((node.pass_qps() - 1.0).abs() < f64::EPSILON);
        assert_eq!(node.total_pass(), 6);
    }

    #[test]
    fn metric_nodes_render_live_minute_buckets() {
        let (clock, node) = node_at(60_000);
        node.add_pass_request(4);
        node.increase_block(1);
        clock.advance(1_000);
        node.add_pass_request(2);

        let nodes = node.metric_nodes("orders");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].timestamp_ms, 60_000);
        assert_eq!(nodes[0].pass_qps, 4);
        assert_eq!(nodes[0].block_qps, 1);
        assert_eq!(nodes[1].pass_qps, 2);
        assert!(nodes.iter().all(|n| n.resource == "orders"));
    }
}
