//! Resource identity.
//!
//! A resource is the named unit of protection: an API route, a method, a SQL
//! statement. Two wrappers are equal when their names are equal; the
//! classification and traffic direction are descriptive only.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Classification of a guarded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    #[default]
    Common,
    Web,
    Rpc,
    ApiGateway,
    DbSql,
}

/// Direction of the guarded traffic relative to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficType {
    /// Requests received from upstream callers.
    #[default]
    Inbound,
    /// Requests this process sends to downstream services.
    Outbound,
}

/// A named guarded operation.
#[derive(Debug, Clone)]
pub struct ResourceWrapper {
    name: Arc<str>,
    resource_type: ResourceType,
    traffic_type: TrafficType,
}

impl ResourceWrapper {
    #[must_use]
    pub fn new(name: &str, resource_type: ResourceType, traffic_type: TrafficType) -> Self {
        Self {
            name: Arc::from(name),
            resource_type,
            traffic_type,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub(crate) fn name_shared(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    #[must_use]
    pub fn traffic_type(&self) -> TrafficType {
        self.traffic_type
    }
}

impl From<&str> for ResourceWrapper {
    fn from(name: &str) -> Self {
        Self::new(name, ResourceType::Common, TrafficType::Inbound)
    }
}

impl PartialEq for ResourceWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ResourceWrapper {}

impl Hash for ResourceWrapper {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ResourceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
