//! The node graph: per-resource and per-context statistics aggregators.

mod cluster_node;
mod default_node;
mod metric_node;
mod statistic_node;

pub use cluster_node::{ClusterNode, ClusterNodeRegistry};
pub use default_node::{DefaultNode, EntranceNode};
pub use metric_node::MetricNode;
pub use statistic_node::StatisticNode;
