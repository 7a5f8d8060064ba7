//! Error taxonomy.
//!
//! Two families:
//!
//! - [`BlockError`]: a recoverable admission rejection raised by the pipeline
//!   and caught by the host around each entry. Counted as "block" in the
//!   statistics runtime.
//! - [`EngineError`]: fatal protocol violations (mis-paired exits, contexts
//!   abandoned with live entries, invalid configuration). Never counted,
//!   always surfaced.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::flow::FlowRule;

/// The kind of pipeline stage that rejected an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// A flow rule threshold was exceeded.
    Flow,
    /// A circuit breaker is open.
    Degrade,
    /// The caller is denied by an authority rule.
    Authority,
    /// The process is globally overloaded.
    System,
    /// A hotspot parameter threshold was exceeded.
    HotParam,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flow => "flow",
            Self::Degrade => "degrade",
            Self::Authority => "authority",
            Self::System => "system",
            Self::HotParam => "hot-param",
        };
        f.write_str(name)
    }
}

/// A typed admission rejection.
#[derive(Debug, Clone, Error)]
#[error("{kind} block on resource `{resource}`")]
pub struct BlockError {
    kind: BlockKind,
    resource: Arc<str>,
    origin: String,
    rule: Option<Arc<FlowRule>>,
}

impl BlockError {
    #[must_use]
    pub fn new(kind: BlockKind, resource: Arc<str>, origin: String) -> Self {
        Self {
            kind,
            resource,
            origin,
            rule: None,
        }
    }

    /// A flow-rule rejection carrying the rule that triggered it.
    #[must_use]
    pub fn flow(resource: Arc<str>, origin: String, rule: Arc<FlowRule>) -> Self {
        Self {
            kind: BlockKind::Flow,
            resource,
            origin,
            rule: Some(rule),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Origin of the blocked caller, empty when anonymous.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The flow rule that rejected the admission, if any.
    #[must_use]
    pub fn triggered_rule(&self) -> Option<&Arc<FlowRule>> {
        self.rule.as_ref()
    }
}

/// Fatal engine protocol violations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `exit` was called for an entry that is not the current one.
    #[error("mis-paired exit: current entry is `{expected}`, exited `{actual}`")]
    MispairedExit { expected: String, actual: String },

    /// `exit` was called on a context with no in-flight entry.
    #[error("no active entry in context `{0}`")]
    NoActiveEntry(String),

    /// A context was closed while entries were still in flight.
    #[error("context `{context}` closed with {outstanding} outstanding entries")]
    ContextBusy { context: String, outstanding: usize },

    /// Engine construction was given an unusable configuration.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}
