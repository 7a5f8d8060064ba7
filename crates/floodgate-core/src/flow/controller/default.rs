//! Immediate reject, with optional priority occupancy.

use std::sync::Arc;
use std::time::Duration;

use crate::flow::controller::ShapingOutcome;
use crate::flow::rule::FlowGrade;
use crate::node::StatisticNode;
use crate::time::{Clock, Sleeper};

/// Threshold test against current usage. Prioritized QPS requests that fail
/// the test may instead pledge a future window and wait for it.
pub struct DefaultController {
    count: f64,
    grade: FlowGrade,
    occupy_timeout_ms: u64,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl DefaultController {
    #[must_use]
    pub fn new(
        count: f64,
        grade: FlowGrade,
        occupy_timeout_ms: u64,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            count,
            grade,
            occupy_timeout_ms,
            clock,
            sleeper,
        }
    }

    fn used_tokens(&self, node: &StatisticNode) -> f64 {
        match self.grade {
            FlowGrade::Thread => f64::from(node.cur_thread_num()),
            FlowGrade::Qps => node.pass_qps(),
        }
    }

    pub fn can_pass(&self, node: &StatisticNode, acquire: u32, prioritized: bool) -> ShapingOutcome {
        if self.used_tokens(node) + f64::from(acquire) <= self.count {
            return ShapingOutcome::Pass;
        }
        if prioritized && self.grade == FlowGrade::Qps {
            let now = self.clock.now_ms();
            if let Some(wait) =
                node.occupy_next(now, acquire, self.count, self.occupy_timeout_ms)
            {
                node.add_occupied_pass(acquire);
                self.sleeper.sleep(Duration::from_millis(wait));
                return ShapingOutcome::PriorityWait { wait_ms: wait };
            }
        }
        ShapingOutcome::Reject
    }
}
