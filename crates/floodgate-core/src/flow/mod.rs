//! Flow rules, the checker, and the traffic-shaping controllers.

mod checker;
mod controller;
mod rule;
mod rule_manager;

pub use controller::{
    DefaultController, RateLimiterController, ShapingOutcome, TrafficShaper, WarmUpController,
};
pub use rule::{ControlBehavior, FlowGrade, FlowRule, RelationStrategy};
pub use rule_manager::{CompiledFlowRule, FlowRuleManager};

use std::sync::Arc;

use crate::context::Context;
use crate::node::ClusterNodeRegistry;
use crate::resource::ResourceWrapper;
use crate::slots::{Downstream, ProcessorSlot, SlotResult};

/// The pipeline stage that enforces flow rules.
pub struct FlowSlot {
    manager: Arc<FlowRuleManager>,
    clusters: Arc<ClusterNodeRegistry>,
}

impl FlowSlot {
    #[must_use]
    pub fn new(manager: Arc<FlowRuleManager>, clusters: Arc<ClusterNodeRegistry>) -> Self {
        Self { manager, clusters }
    }
}

impl ProcessorSlot for FlowSlot {
    fn entry(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        prioritized: bool,
        downstream: Downstream<'_>,
    ) -> SlotResult {
        checker::check_flow(&self.manager, &self.clusters, ctx, resource, count, prioritized)?;
        downstream.fire_entry(ctx, resource, count, prioritized)
    }

    fn exit(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        downstream: Downstream<'_>,
    ) {
        downstream.fire_exit(ctx, resource, count);
    }
}
