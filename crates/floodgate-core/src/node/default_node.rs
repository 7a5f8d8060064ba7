//! Per-(context, resource) statistics and the calling tree.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::node::cluster_node::ClusterNode;
use crate::node::statistic_node::StatisticNode;
use crate::resource::{ResourceType, ResourceWrapper, TrafficType};
use crate::time::Clock;

/// Statistics of one resource as seen from one named context, and a node of
/// that context's calling tree. Ownership runs parent to child only; the
/// bound cluster node is shared, not owned.
pub struct DefaultNode {
    stats: StatisticNode,
    resource: ResourceWrapper,
    cluster: RwLock<Option<Arc<ClusterNode>>>,
    children: RwLock<Vec<Arc<DefaultNode>>>,
}

impl DefaultNode {
    #[must_use]
    pub fn new(
        resource: ResourceWrapper,
        sample_count: usize,
        interval_ms: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            stats: StatisticNode::new(sample_count, interval_ms, clock),
            resource,
            cluster: RwLock::new(None),
            children: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &ResourceWrapper {
        &self.resource
    }

    #[must_use]
    pub fn cluster_node(&self) -> Option<Arc<ClusterNode>> {
        self.cluster.read().clone()
    }

    pub fn set_cluster_node(&self, cluster: Arc<ClusterNode>) {
        *self.cluster.write() = Some(cluster);
    }

    pub fn add_child(&self, child: Arc<DefaultNode>) {
        let mut children = self.children.write();
        if !children.iter().any(|c| Arc::ptr_eq(c, &child)) {
            children.push(child);
        }
    }

    #[must_use]
    pub fn children(&self) -> Vec<Arc<DefaultNode>> {
        self.children.read().clone()
    }

    // Recording methods shadow the inner statistic node so every increment
    // cascades to the resource-global cluster node.

    pub fn add_pass_request(&self, n: u32) {
        self.stats.add_pass_request(n);
        if let Some(cluster) = self.cluster_node() {
            cluster.stats().add_pass_request(n);
        }
    }

    pub fn add_rt_and_success(&self, rt_ms: u64, n: u32) {
        self.stats.add_rt_and_success(rt_ms, n);
        if let Some(cluster) = self.cluster_node() {
            cluster.stats().add_rt_and_success(rt_ms, n);
        }
    }

    pub fn increase_block(&self, n: u32) {
        self.stats.increase_block(n);
        if let Some(cluster) = self.cluster_node() {
            cluster.stats().increase_block(n);
        }
    }

    pub fn increase_exception(&self, n: u32) {
        self.stats.increase_exception(n);
        if let Some(cluster) = self.cluster_node() {
            cluster.stats().increase_exception(n);
        }
    }

    pub fn increase_thread_num(&self) {
        self.stats.increase_thread_num();
        if let Some(cluster) = self.cluster_node() {
            cluster.stats().increase_thread_num();
        }
    }

    pub fn decrease_thread_num(&self) {
        self.stats.decrease_thread_num();
        if let Some(cluster) = self.cluster_node() {
            cluster.stats().decrease_thread_num();
        }
    }
}

impl Deref for DefaultNode {
    type Target = StatisticNode;

    fn deref(&self) -> &StatisticNode {
        &self.stats
    }
}

/// Root of a context's calling tree.
///
/// Carries no traffic of its own; the read-side aggregates sum over the
/// direct children instead, so an entrance reports its whole subtree.
pub struct EntranceNode {
    node: Arc<DefaultNode>,
}

impl EntranceNode {
    #[must_use]
    pub fn new(context_name: &str, sample_count: usize, interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        let resource =
            ResourceWrapper::new(context_name, ResourceType::Common, TrafficType::Inbound);
        Self {
            node: Arc::new(DefaultNode::new(resource, sample_count, interval_ms, clock)),
        }
    }

    #[must_use]
    pub fn as_default_node(&self) -> Arc<DefaultNode> {
        Arc::clone(&self.node)
    }

    #[must_use]
    pub fn pass_qps(&self) -> f64 {
        self.node.children().iter().map(|c| c.pass_qps()).sum()
    }

    #[must_use]
    pub fn block_qps(&self) -> f64 {
        self.node.children().iter().map(|c| c.block_qps()).sum()
    }

    #[must_use]
    pub fn success_qps(&self) -> f64 {
        self.node.children().iter().map(|c| c.success_qps()).sum()
    }

    #[must_use]
    pub fn total_qps(&self) -> f64 {
        self.pass_qps() + self.block_qps()
    }

    #[must_use]
    pub fn cur_thread_num(&self) -> u32 {
        self.node.children().iter().map(|c| c.cur_thread_num()).sum()
    }

    #[must_use]
    pub fn avg_rt(&self) -> f64 {
        let children = self.node.children();
        if children.is_empty() {
            return 0.0;
        }
        children.iter().map(|c| c.avg_rt()).sum::<f64>() / children.len() as f64
    }
}

impl Deref for EntranceNode {
    type Target = DefaultNode;

    fn deref(&self) -> &DefaultNode {
        &self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(10_000))
    }

    #[test]
    fn increments_cascade_to_the_cluster_node() {
        let clock = clock();
        let node = DefaultNode::new(
            ResourceWrapper::from("orders"),
            2,
            1_000,
            Arc::clone(&clock),
        );
        let cluster = Arc::new(ClusterNode::new(
            "orders",
            ResourceType::Common,
            2,
            1_000,
            Arc::clone(&clock),
        ));
        node.set_cluster_node(Arc::clone(&cluster));

        node.add_pass_request(2);
        node.increase_block(1);
        node.increase_thread_num();

        assert_eq!(node.total_pass(), 2);
        assert_eq!(cluster.total_pass(), 2);
        assert_eq!(cluster.block_request(), 1);
        assert_eq!(cluster.cur_thread_num(), 1);
    }

    #[test]
    fn entrance_aggregates_children() {
        let clock = clock();
        let entrance = EntranceNode::new("web-entry", 2, 1_000, Arc::clone(&clock));
        let a = Arc::new(DefaultNode::new(
            ResourceWrapper::from("a"),
            2,
            1_000,
            Arc::clone(&clock),
        ));
        let b = Arc::new(DefaultNode::new(
            ResourceWrapper::from("b"),
            2,
            1_000,
            Arc::clone(&clock),
        ));
        entrance.add_child(Arc::clone(&a));
        entrance.add_child(Arc::clone(&b));
        entrance.add_child(Arc::clone(&a));

        a.add_pass_request(3);
        b.add_pass_request(1);
        b.increase_block(2);

        assert_eq!(entrance.as_default_node().children().len(), 2);
        assert!((entrance.pass_qps() - 4.0).abs() < f64::EPSILON);
        assert!((entrance.block_qps() - 2.0).abs() < f64::EPSILON);
        assert!((entrance.total_qps() - 6.0).abs() < f64::EPSILON);
    }
}
