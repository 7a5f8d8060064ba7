//! Builds the calling tree.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::context::Context;
use crate::node::DefaultNode;
use crate::resource::ResourceWrapper;
use crate::slots::{Downstream, ProcessorSlot, SlotResult};
use crate::time::Clock;

/// Selects (and lazily creates) the per-context [`DefaultNode`] for the
/// chain's resource, attaches it under the context's parent node, and makes
/// it the context's current node.
///
/// One instance per resource chain, so the map is keyed by context name
/// alone. Published copy-on-write: the same resource entered from the same
/// set of contexts settles into pure lock-free reads.
pub struct NodeSelectorSlot {
    nodes: RwLock<Arc<HashMap<Arc<str>, Arc<DefaultNode>>>>,
    write_lock: Mutex<()>,
    sample_count: usize,
    interval_ms: u64,
    clock: Arc<dyn Clock>,
}

impl NodeSelectorSlot {
    #[must_use]
    pub fn new(sample_count: usize, interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            nodes: RwLock::new(Arc::new(HashMap::new())),
            write_lock: Mutex::new(()),
            sample_count,
            interval_ms,
            clock,
        }
    }

    fn node_for(&self, ctx: &Context, resource: &ResourceWrapper) -> Arc<DefaultNode> {
        if let Some(node) = self.nodes.read().get(ctx.name()) {
            return Arc::clone(node);
        }
        let _guard = self.write_lock.lock();
        if let Some(node) = self.nodes.read().get(ctx.name()) {
            return Arc::clone(node);
        }
        let node = Arc::new(DefaultNode::new(
            resource.clone(),
            self.sample_count,
            self.interval_ms,
            Arc::clone(&self.clock),
        ));
        let current = Arc::clone(&self.nodes.read());
        let mut replacement = HashMap::with_capacity(current.len() + 1);
        replacement.extend(current.iter().map(|(k, v)| (Arc::clone(k), Arc::clone(v))));
        replacement.insert(Arc::from(ctx.name()), Arc::clone(&node));
        *self.nodes.write() = Arc::new(replacement);

        ctx.last_node().add_child(Arc::clone(&node));
        node
    }
}

impl ProcessorSlot for NodeSelectorSlot {
    fn entry(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        prioritized: bool,
        downstream: Downstream<'_>,
    ) -> SlotResult {
        let node = self.node_for(ctx, resource);
        ctx.set_cur_node(node);
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
