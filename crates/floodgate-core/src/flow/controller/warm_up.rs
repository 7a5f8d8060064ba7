//! Token bucket with a cold-to-hot ramp.
//!
//! A full bucket means the resource is cold: permitted QPS starts at
//! `count / cold_factor` and rises along a slope as the bucket drains
//! through the warning line, reaching `count` when the line is crossed.
//! Token accounting is integer fixed-point (milli-tokens) computed from the
//! saved fill timestamp, so sustained calls do not drift.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::flow::controller::ShapingOutcome;
use crate::node::StatisticNode;
use crate::time::Clock;

const MILLI: u64 = 1_000;

pub struct WarmUpController {
    count: f64,
    cold_factor: u32,
    /// Token level above which the bucket is considered cold.
    warning_token: u64,
    max_token: u64,
    slope: f64,
    stored_milli_tokens: AtomicU64,
    last_fill_ms: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl WarmUpController {
    /// `count` must be positive and `cold_factor` greater than one; rule
    /// compilation enforces both.
    #[must_use]
    pub fn new(count: f64, warm_up_period_sec: u32, cold_factor: u32, clock: Arc<dyn Clock>) -> Self {
        let period = f64::from(warm_up_period_sec);
        let factor = f64::from(cold_factor);
        let warning_token = (period * count / (factor - 1.0)) as u64;
        let max_token = warning_token + (2.0 * period * count / (1.0 + factor)) as u64;
        let slope = (factor - 1.0) / count / (max_token - warning_token) as f64;
        Self {
            count,
            cold_factor,
            warning_token,
            max_token,
            slope,
            stored_milli_tokens: AtomicU64::new(0),
            // Zero means never filled; the first sync tops the bucket up.
            last_fill_ms: AtomicU64::new(0),
            clock,
        }
    }

    #[must_use]
    pub fn warning_token(&self) -> u64 {
        self.warning_token
    }

    #[must_use]
    pub fn max_token(&self) -> u64 {
        self.max_token
    }

    /// Current bucket level in tokens.
    #[must_use]
    pub fn stored_tokens(&self) -> f64 {
        self.stored_milli_tokens.load(Ordering::Acquire) as f64 / MILLI as f64
    }

    /// Once per wall-clock second, roll the bucket forward. Refill pauses
    /// while the bucket sits above the warning line and traffic already runs
    /// at or beyond the cold rate; that pause is what lets sustained load
    /// drain the bucket and finish the ramp.
    ///
    /// `previous_qps` is the previous full second's pass rate. The
    /// instantaneous sliding rate dips right after a window turn and would
    /// re-open the refill gate under steady load.
    fn sync(&self, now_ms: u64, previous_qps: f64) {
        let aligned = now_ms - now_ms % MILLI;
        let last = self.last_fill_ms.load(Ordering::Acquire);
        if aligned <= last {
            return;
        }
        let stored = self.stored_milli_tokens.load(Ordering::Acquire);
        let warning_milli = self.warning_token * MILLI;
        // The floors matter: traffic running at the cold rate must not
        // refill, or sustained load would never drain the bucket.
        let cold_rate = self.count as u64 / u64::from(self.cold_factor);
        let refill = stored < warning_milli
            || (stored > warning_milli && (previous_qps as u64) < cold_rate);
        let new = if refill {
            // `count` tokens per second is `count` milli-tokens per ms.
            let added = ((aligned - last) as f64 * self.count).round() as u64;
            stored.saturating_add(added).min(self.max_token * MILLI)
        } else {
            stored
        };
        if self
            .stored_milli_tokens
            .compare_exchange(stored, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.last_fill_ms.store(aligned, Ordering::Release);
        }
    }

    pub fn can_pass(&self, node: &StatisticNode, acquire: u32) -> ShapingOutcome {
        let pass_qps = node.pass_qps();
        self.sync(self.clock.now_ms(), node.previous_pass_qps());

        let rest_tokens = self.stored_tokens();
        let admitted = if rest_tokens >= self.warning_token as f64 {
            let above = rest_tokens - self.warning_token as f64;
            let warning_qps = 1.0 / (above * self.slope + 1.0 / self.count);
            pass_qps + f64::from(acquire) <= warning_qps
        } else {
            pass_qps + f64::from(acquire) <= self.count
        };
        if !admitted {
            return ShapingOutcome::Reject;
        }
        let _ = self.stored_milli_tokens.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |v| Some(v.saturating_sub(u64::from(acquire) * MILLI)),
        );
        ShapingOutcome::Pass
    }
}
