//! Resource-global statistics shared across all contexts.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::node::statistic_node::StatisticNode;
use crate::resource::{ResourceType, ResourceWrapper};
use crate::time::Clock;

/// Statistics of one resource summed over every context, plus one statistic
/// node per distinct caller origin.
pub struct ClusterNode {
    stats: StatisticNode,
    name: Arc<str>,
    resource_type: ResourceType,
    /// Copy-on-write: the map pointer is swapped whole on insert. Origins
    /// stabilise quickly, so writes are rare and reads stay contention-free.
    origin_nodes: RwLock<Arc<HashMap<String, Arc<StatisticNode>>>>,
    sample_count: usize,
    interval_ms: u64,
    clock: Arc<dyn Clock>,
}

impl ClusterNode {
    #[must_use]
    pub fn new(
        name: &str,
        resource_type: ResourceType,
        sample_count: usize,
        interval_ms: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            stats: StatisticNode::new(sample_count, interval_ms, Arc::clone(&clock)),
            name: Arc::from(name),
            resource_type,
            origin_nodes: RwLock::new(Arc::new(HashMap::new())),
            sample_count,
            interval_ms,
            clock,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    #[must_use]
    pub fn stats(&self) -> &StatisticNode {
        &self.stats
    }

    /// The statistic node partitioning this resource's traffic by `origin`,
    /// created on first sight of the caller.
    #[must_use]
    pub fn get_or_create_origin_node(&self, origin: &str) -> Arc<StatisticNode> {
        if let Some(node) = self.origin_nodes.read().get(origin) {
            return Arc::clone(node);
        }
        let mut guard = self.origin_nodes.write();
        if let Some(node) = guard.get(origin) {
            return Arc::clone(node);
        }
        let node = Arc::new(StatisticNode::new(
            self.sample_count,
            self.interval_ms,
            Arc::clone(&self.clock),
        ));
        let mut replacement = HashMap::with_capacity(guard.len() + 1);
        replacement.extend(guard.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
        replacement.insert(origin.to_owned(), Arc::clone(&node));
        *guard = Arc::new(replacement);
        node
    }

    #[must_use]
    pub fn origin_node(&self, origin: &str) -> Option<Arc<StatisticNode>> {
        self.origin_nodes.read().get(origin).cloned()
    }

    /// Snapshot of the origin partition map.
    #[must_use]
    pub fn origin_nodes(&self) -> Arc<HashMap<String, Arc<StatisticNode>>> {
        Arc::clone(&self.origin_nodes.read())
    }
}

impl Deref for ClusterNode {
    type Target = StatisticNode;

    fn deref(&self) -> &StatisticNode {
        &self.stats
    }
}

/// Process-wide index of cluster nodes, exactly one per resource name.
pub struct ClusterNodeRegistry {
    nodes: RwLock<Arc<HashMap<Arc<str>, Arc<ClusterNode>>>>,
    build_lock: Mutex<()>,
    sample_count: usize,
    interval_ms: u64,
    clock: Arc<dyn Clock>,
}

impl ClusterNodeRegistry {
    #[must_use]
    pub fn new(sample_count: usize, interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            nodes: RwLock::new(Arc::new(HashMap::new())),
            build_lock: Mutex::new(()),
            sample_count,
            interval_ms,
            clock,
        }
    }

    #[must_use]
    pub fn get_or_create(&self, resource: &ResourceWrapper) -> Arc<ClusterNode> {
        if let Some(node) = self.nodes.read().get(resource.name()) {
            return Arc::clone(node);
        }
        let _guard = self.build_lock.lock();
        if let Some(node) = self.nodes.read().get(resource.name()) {
            return Arc::clone(node);
        }
        let node = Arc::new(ClusterNode::new(
            resource.name(),
            resource.resource_type(),
            self.sample_count,
            self.interval_ms,
            Arc::clone(&self.clock),
        ));
        let current = Arc::clone(&self.nodes.read());
        let mut replacement = HashMap::with_capacity(current.len() + 1);
        replacement.extend(current.iter().map(|(k, v)| (Arc::clone(k), Arc::clone(v))));
        replacement.insert(resource.name_shared(), Arc::clone(&node));
        *self.nodes.write() = Arc::new(replacement);
        node
    }

    #[must_use]
    pub fn get(&self, resource_name: &str) -> Option<Arc<ClusterNode>> {
        self.nodes.read().get(resource_name).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<Arc<str>, Arc<ClusterNode>>> {
        Arc::clone(&self.nodes.read())
    }
}
