//! Rule evaluation: pick the reference node, delegate to the shaper.

use std::sync::Arc;

use crate::context::Context;
use crate::error::BlockError;
use crate::flow::controller::ShapingOutcome;
use crate::flow::rule::{FlowRule, RelationStrategy};
use crate::flow::rule_manager::FlowRuleManager;
use crate::node::{ClusterNode, ClusterNodeRegistry, DefaultNode, StatisticNode};
use crate::resource::ResourceWrapper;
use crate::slots::{SlotInterrupt, SlotResult};

/// The node a rule's threshold is measured against.
enum RefNode {
    Cluster(Arc<ClusterNode>),
    Default(Arc<DefaultNode>),
    Origin(Arc<StatisticNode>),
}

impl RefNode {
    fn stats(&self) -> &StatisticNode {
        match self {
            Self::Cluster(node) => node,
            Self::Default(node) => node,
            Self::Origin(node) => node,
        }
    }
}

/// Evaluate every rule of `resource` in order until one rejects.
pub(crate) fn check_flow(
    manager: &FlowRuleManager,
    clusters: &ClusterNodeRegistry,
    ctx: &Context,
    resource: &ResourceWrapper,
    count: u32,
    prioritized: bool,
) -> SlotResult {
    let Some(rules) = manager.rules_for(resource.name()) else {
        return Ok(());
    };
    for compiled in rules.iter() {
        let Some(node) = select_reference_node(compiled.rule(), manager, clusters, ctx) else {
            continue;
        };
        match compiled.shaper().can_pass(node.stats(), count, prioritized) {
            ShapingOutcome::Pass => {}
            ShapingOutcome::Reject => {
                return Err(SlotInterrupt::Block(BlockError::flow(
                    resource.name_shared(),
                    ctx.origin().to_owned(),
                    Arc::clone(compiled.rule()),
                )));
            }
            ShapingOutcome::PriorityWait { wait_ms } => {
                return Err(SlotInterrupt::PriorityWait { wait_ms });
            }
        }
    }
    Ok(())
}

/// Resolve the caller filter and relation strategy to a node, or `None` when
/// the rule does not apply to this admission.
fn select_reference_node(
    rule: &FlowRule,
    manager: &FlowRuleManager,
    clusters: &ClusterNodeRegistry,
    ctx: &Context,
) -> Option<RefNode> {
    let origin = ctx.origin();
    let limit_app = rule.limit_app.as_str();
    let cur_node = ctx.cur_node()?;

    let origin_specific = limit_app != FlowRule::LIMIT_APP_DEFAULT
        && limit_app != FlowRule::LIMIT_APP_OTHER
        && limit_app == origin;
    let applies = origin_specific
        || limit_app == FlowRule::LIMIT_APP_DEFAULT
        || (limit_app == FlowRule::LIMIT_APP_OTHER
            && !manager.is_origin_named(&rule.resource, origin));
    if !applies {
        return None;
    }

    match rule.strategy {
        RelationStrategy::Direct => {
            if origin_specific {
                ctx.origin_node().map(RefNode::Origin)
            } else {
                cur_node.cluster_node().map(RefNode::Cluster)
            }
        }
        RelationStrategy::Relate => clusters.get(&rule.ref_resource).map(RefNode::Cluster),
        RelationStrategy::Chain => {
            (ctx.name() == rule.ref_resource).then(|| RefNode::Default(cur_node))
        }
    }
}
