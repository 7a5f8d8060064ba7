//! Binds the resource-global node and the caller partition.

use std::sync::Arc;

use crate::context::Context;
use crate::node::ClusterNodeRegistry;
use crate::resource::ResourceWrapper;
use crate::slots::{Downstream, ProcessorSlot, SlotResult};

/// Ensures the current node is bound to its resource's [`ClusterNode`]
/// (exactly one per resource name, engine wide) and, when the context names
/// a caller origin, binds the origin statistic node to the current entry.
pub struct ClusterBuilderSlot {
    registry: Arc<ClusterNodeRegistry>,
}

impl ClusterBuilderSlot {
    #[must_use]
    pub fn new(registry: Arc<ClusterNodeRegistry>) -> Self {
        Self { registry }
    }
}

impl ProcessorSlot for ClusterBuilderSlot {
    fn entry(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        prioritized: bool,
        downstream: Downstream<'_>,
    ) -> SlotResult {
        if let Some(node) = ctx.cur_node() {
            let cluster = self.registry.get_or_create(resource);
            if node.cluster_node().is_none() {
                node.set_cluster_node(Arc::clone(&cluster));
            }
            if !ctx.origin().is_empty() {
                let origin_node = cluster.get_or_create_origin_node(ctx.origin());
                ctx.set_origin_node(origin_node);
            }
        }
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
