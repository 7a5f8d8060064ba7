//! Sliding-window metric over a [`LeapArray`], optionally paired with a
//! future-horizon ring for priority occupancy.

use std::sync::Arc;

use super::leap_array::{LeapArray, MetricEvent, WindowWrap};

/// Aggregating view over one ring of buckets.
pub struct SlidingMetric {
    data: LeapArray,
    /// Pledges against windows that have not started yet. Present only on
    /// the second-level metric.
    future: Option<Arc<LeapArray>>,
}

impl SlidingMetric {
    #[must_use]
    pub fn new(sample_count: usize, interval_ms: u64) -> Self {
        Self {
            data: LeapArray::new(sample_count, interval_ms),
            future: None,
        }
    }

    /// A metric whose buckets absorb future-window pledges when they turn.
    #[must_use]
    pub fn with_future_occupancy(sample_count: usize, interval_ms: u64) -> Self {
        let future = Arc::new(LeapArray::new_future(sample_count, interval_ms));
        Self {
            data: LeapArray::with_occupancy_seed(sample_count, interval_ms, Arc::clone(&future)),
            future: Some(future),
        }
    }

    #[must_use]
    pub fn window_length_ms(&self) -> u64 {
        self.data.window_length_ms()
    }

    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.data.interval_ms()
    }

    #[must_use]
    pub fn interval_sec(&self) -> f64 {
        self.data.interval_ms() as f64 / 1_000.0
    }

    pub fn add(&self, event: MetricEvent, n: u64, now_ms: u64) {
        self.data.window_at(now_ms).bucket().add(event, n);
    }

    pub fn add_rt(&self, rt_ms: u64, now_ms: u64) {
        self.data.window_at(now_ms).bucket().add_rt(rt_ms);
    }

    #[must_use]
    pub fn count(&self, event: MetricEvent, now_ms: u64) -> u64 {
        // Force the current window to turn so pledges and resets are
        // reflected before summing.
        let _ = self.data.window_at(now_ms);
        self.data.count(event, now_ms)
    }

    /// Admitted requests including pre-paid future-window admissions.
    #[must_use]
    pub fn pass_with_occupied(&self, now_ms: u64) -> u64 {
        let _ = self.data.window_at(now_ms);
        self.data.count(MetricEvent::Pass, now_ms)
            + self.data.count(MetricEvent::OccupiedPass, now_ms)
    }

    /// Admitted plus pre-paid pass recorded in the single bucket covering
    /// `time_ms`, zero when that bucket holds another window.
    #[must_use]
    pub fn window_pass_at(&self, time_ms: u64) -> u64 {
        self.data.get_valid(time_ms).map_or(0, |w| {
            w.bucket().get(MetricEvent::Pass) + w.bucket().get(MetricEvent::OccupiedPass)
        })
    }

    /// One counter from the single bucket covering `time_ms`, zero when the
    /// bucket holds another window.
    #[must_use]
    pub fn window_event_at(&self, event: MetricEvent, time_ms: u64) -> u64 {
        self.data.get_valid(time_ms).map_or(0, |w| w.bucket().get(event))
    }

    /// Smallest response time over the live buckets, `None` when idle.
    #[must_use]
    pub fn min_rt_ms(&self, now_ms: u64) -> Option<u64> {
        let _ = self.data.window_at(now_ms);
        self.data
            .live_windows(now_ms)
            .filter_map(|w| w.bucket().min_rt_ms())
            .min()
    }

    /// Total pass currently pledged against future windows.
    #[must_use]
    pub fn waiting(&self, now_ms: u64) -> u64 {
        self.future
            .as_ref()
            .map_or(0, |f| f.count(MetricEvent::Pass, now_ms))
    }

    /// Pledge `n` pass against the future window covering `future_time_ms`.
    pub fn add_waiting(&self, future_time_ms: u64, n: u64) {
        if let Some(future) = &self.future {
            future.window_at(future_time_ms).bucket().add(MetricEvent::Pass, n);
        }
    }

    /// Buckets live at `now_ms`, oldest data included, in ring order.
    pub fn live_windows(&self, now_ms: u64) -> impl Iterator<Item = &WindowWrap> {
        let _ = self.data.window_at(now_ms);
        self.data.live_windows(now_ms)
    }
}
