//! Time-bucketed atomic counter ring with lazy reset.
//!
//! The ring has `sample_count` buckets, each covering `window_length_ms`
//! milliseconds, for a total span of `interval_ms`. A timestamp maps to the
//! bucket at `(t / window_length_ms) % sample_count`; the bucket is valid for
//! that timestamp iff its recorded start equals the aligned window start.
//! Stale buckets are reclaimed in place: the claimant wins a CAS on the
//! bucket's start, resets the counters, and everyone else retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter kinds recorded per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    Pass,
    Block,
    Exception,
    Success,
    Rt,
    /// Pass pledged from a future window via priority occupancy.
    OccupiedPass,
}

impl MetricEvent {
    pub(crate) const COUNT: usize = 6;

    fn idx(self) -> usize {
        match self {
            Self::Pass => 0,
            Self::Block => 1,
            Self::Exception => 2,
            Self::Success => 3,
            Self::Rt => 4,
            Self::OccupiedPass => 5,
        }
    }
}

/// One bucket of counters.
pub struct MetricBucket {
    counters: [AtomicU64; MetricEvent::COUNT],
    min_rt_ms: AtomicU64,
}

impl MetricBucket {
    fn new() -> Self {
        Self {
            counters: Default::default(),
            min_rt_ms: AtomicU64::new(u64::MAX),
        }
    }

    pub fn add(&self, event: MetricEvent, n: u64) {
        self.counters[event.idx()].fetch_add(n, Ordering::AcqRel);
    }

    #[must_use]
    pub fn get(&self, event: MetricEvent) -> u64 {
        self.counters[event.idx()].load(Ordering::Acquire)
    }

    /// Record one response-time sample.
    pub fn add_rt(&self, rt_ms: u64) {
        self.add(MetricEvent::Rt, rt_ms);
        self.min_rt_ms.fetch_min(rt_ms, Ordering::AcqRel);
    }

    /// Minimal recorded response time, `None` when the bucket saw no exit.
    #[must_use]
    pub fn min_rt_ms(&self) -> Option<u64> {
        let v = self.min_rt_ms.load(Ordering::Acquire);
        (v != u64::MAX).then_some(v)
    }

    fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Release);
        }
        self.min_rt_ms.store(u64::MAX, Ordering::Release);
    }
}

/// A bucket plus the start of the window it currently represents.
pub struct WindowWrap {
    start_ms: AtomicU64,
    bucket: MetricBucket,
}

impl WindowWrap {
    #[must_use]
    pub fn start_ms(&self) -> u64 {
        self.start_ms.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn bucket(&self) -> &MetricBucket {
        &self.bucket
    }
}

/// Whether buckets count the present interval or pledged future windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Horizon {
    /// Buckets within `interval_ms` of now are live.
    Current,
    /// Only buckets strictly ahead of now are live; the rest have already
    /// been transferred into the paired current-horizon ring.
    Future,
}

/// Ring of time-bucketed counter cells.
pub struct LeapArray {
    window_length_ms: u64,
    sample_count: usize,
    interval_ms: u64,
    windows: Box<[WindowWrap]>,
    horizon: Horizon,
    /// Future-horizon ring whose pledged pass is folded into a bucket as
    /// `OccupiedPass` the moment the bucket is reset to a new window.
    occupancy_seed: Option<Arc<LeapArray>>,
}

impl LeapArray {
    #[must_use]
    pub fn new(sample_count: usize, interval_ms: u64) -> Self {
        Self::build(sample_count, interval_ms, Horizon::Current, None)
    }

    /// A ring that tracks pledges against windows that have not started yet.
    #[must_use]
    pub fn new_future(sample_count: usize, interval_ms: u64) -> Self {
        Self::build(sample_count, interval_ms, Horizon::Future, None)
    }

    /// A current-horizon ring seeded from `future` on every bucket turn.
    #[must_use]
    pub fn with_occupancy_seed(sample_count: usize, interval_ms: u64, future: Arc<LeapArray>) -> Self {
        Self::build(sample_count, interval_ms, Horizon::Current, Some(future))
    }

    fn build(
        sample_count: usize,
        interval_ms: u64,
        horizon: Horizon,
        occupancy_seed: Option<Arc<LeapArray>>,
    ) -> Self {
        assert!(sample_count > 0, "sample_count must be positive");
        assert!(
            interval_ms > 0 && interval_ms % sample_count as u64 == 0,
            "interval_ms must be a positive multiple of sample_count"
        );
        let windows = (0..sample_count)
            .map(|_| WindowWrap {
                start_ms: AtomicU64::new(0),
                bucket: MetricBucket::new(),
            })
            .collect();
        Self {
            window_length_ms: interval_ms / sample_count as u64,
            sample_count,
            interval_ms,
            windows,
            horizon,
            occupancy_seed,
        }
    }

    #[must_use]
    pub fn window_length_ms(&self) -> u64 {
        self.window_length_ms
    }

    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    fn slot_of(&self, time_ms: u64) -> usize {
        usize::try_from(time_ms / self.window_length_ms).unwrap_or(0) % self.sample_count
    }

    fn window_start(&self, time_ms: u64) -> u64 {
        time_ms - time_ms % self.window_length_ms
    }

    /// The bucket covering `time_ms`, reset and claimed if it still holds an
    /// older window.
    ///
    /// Timestamps may lie in the future; the pledging path relies on that to
    /// claim windows ahead of now.
    pub fn window_at(&self, time_ms: u64) -> &WindowWrap {
        let wrap = &self.windows[self.slot_of(time_ms)];
        let start = self.window_start(time_ms);
        let mut rewind_spins = 0u32;
        loop {
            let seen = wrap.start_ms.load(Ordering::Acquire);
            if seen == start {
                return wrap;
            }
            if seen > start {
                // The bucket is ahead of the requested time: the wall clock
                // went backwards. Spin briefly, then reclaim anyway.
                if rewind_spins < 4 {
                    rewind_spins += 1;
                    std::hint::spin_loop();
                    continue;
                }
            }
            if wrap
                .start_ms
                .compare_exchange(seen, start, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                wrap.bucket.reset();
                if let Some(future) = &self.occupancy_seed {
                    let pledged = future.pledged_at(start);
                    if pledged > 0 {
                        wrap.bucket.add(MetricEvent::OccupiedPass, pledged);
                    }
                }
                return wrap;
            }
        }
    }

    /// The bucket covering `time_ms` only if it currently represents that
    /// window; never claims or resets.
    #[must_use]
    pub fn get_valid(&self, time_ms: u64) -> Option<&WindowWrap> {
        let wrap = &self.windows[self.slot_of(time_ms)];
        (wrap.start_ms() == self.window_start(time_ms)).then_some(wrap)
    }

    /// Pass pledged against the window starting exactly at `start_ms`.
    fn pledged_at(&self, start_ms: u64) -> u64 {
        self.get_valid(start_ms)
            .map_or(0, |w| w.bucket.get(MetricEvent::Pass))
    }

    fn is_live(&self, now_ms: u64, wrap: &WindowWrap) -> bool {
        let start = wrap.start_ms();
        if start == 0 {
            return false;
        }
        match self.horizon {
            Horizon::Current => start <= now_ms && now_ms - start < self.interval_ms,
            Horizon::Future => start > now_ms,
        }
    }

    /// All buckets live at `now_ms`.
    pub fn live_windows(&self, now_ms: u64) -> impl Iterator<Item = &WindowWrap> {
        self.windows.iter().filter(move |w| self.is_live(now_ms, w))
    }

    /// Sum one counter over the live buckets.
    #[must_use]
    pub fn count(&self, event: MetricEvent, now_ms: u64) -> u64 {
        self.live_windows(now_ms)
            .map(|w| w.bucket.get(event))
            .sum()
    }
}
