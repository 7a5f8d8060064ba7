//! The flow rule model.
//!
//! Rules serialize with camelCase keys and integer-coded enums, matching the
//! wire format external rule sources deliver. Unknown keys are ignored and
//! missing fields fall back to defaults.

use serde::{Deserialize, Serialize};

/// What the threshold counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FlowGrade {
    /// Concurrent in-flight requests.
    Thread,
    /// Admitted requests per second.
    #[default]
    Qps,
}

impl TryFrom<u8> for FlowGrade {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Thread),
            1 => Ok(Self::Qps),
            other => Err(format!("unknown flow grade {other}")),
        }
    }
}

impl From<FlowGrade> for u8 {
    fn from(value: FlowGrade) -> Self {
        match value {
            FlowGrade::Thread => 0,
            FlowGrade::Qps => 1,
        }
    }
}

/// Which node's statistics the threshold is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RelationStrategy {
    /// The rule's own resource.
    #[default]
    Direct,
    /// The cluster node of `ref_resource`.
    Relate,
    /// The current node, only inside the entrance chain named by
    /// `ref_resource`.
    Chain,
}

impl TryFrom<u8> for RelationStrategy {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Direct),
            1 => Ok(Self::Relate),
            2 => Ok(Self::Chain),
            other => Err(format!("unknown relation strategy {other}")),
        }
    }
}

impl From<RelationStrategy> for u8 {
    fn from(value: RelationStrategy) -> Self {
        match value {
            RelationStrategy::Direct => 0,
            RelationStrategy::Relate => 1,
            RelationStrategy::Chain => 2,
        }
    }
}

/// How excess traffic is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ControlBehavior {
    /// Reject immediately once the threshold is exceeded.
    #[default]
    Reject,
    /// Token bucket with a cold-to-hot ramp.
    WarmUp,
    /// Leaky bucket: equal spacing through a virtual queue.
    RateLimit,
    /// Declared by the wire format; not a core controller. Falls back to
    /// immediate reject at compile time.
    WarmUpRateLimit,
}

impl TryFrom<u8> for ControlBehavior {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Reject),
            1 => Ok(Self::WarmUp),
            2 => Ok(Self::RateLimit),
            3 => Ok(Self::WarmUpRateLimit),
            other => Err(format!("unknown control behavior {other}")),
        }
    }
}

impl From<ControlBehavior> for u8 {
    fn from(value: ControlBehavior) -> Self {
        match value {
            ControlBehavior::Reject => 0,
            ControlBehavior::WarmUp => 1,
            ControlBehavior::RateLimit => 2,
            ControlBehavior::WarmUpRateLimit => 3,
        }
    }
}

/// One traffic-shaping rule attached to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowRule {
    pub resource: String,
    /// Caller filter: a specific origin, [`FlowRule::LIMIT_APP_DEFAULT`] for
    /// any caller, or [`FlowRule::LIMIT_APP_OTHER`] for callers no other
    /// rule of the resource names.
    pub limit_app: String,
    pub grade: FlowGrade,
    pub count: f64,
    pub strategy: RelationStrategy,
    pub ref_resource: String,
    pub control_behavior: ControlBehavior,
    /// Seconds to ramp from cold to hot; warm-up behavior only.
    pub warm_up_period_sec: u32,
    /// Longest a request may queue; rate-limit behavior only.
    pub max_queueing_time_ms: u32,
    /// Parsed and preserved; rules are always evaluated locally.
    pub cluster_mode: bool,
}

impl Default for FlowRule {
    fn default() -> Self {
        Self {
            resource: String::new(),
            limit_app: Self::LIMIT_APP_DEFAULT.to_owned(),
            grade: FlowGrade::default(),
            count: 0.0,
            strategy: RelationStrategy::default(),
            ref_resource: String::new(),
            control_behavior: ControlBehavior::default(),
            warm_up_period_sec: 0,
            max_queueing_time_ms: 0,
            cluster_mode: false,
        }
    }
}

impl FlowRule {
    /// Matches any caller.
    pub const LIMIT_APP_DEFAULT: &'static str = "default";
    /// Matches callers not named by any other rule of the resource.
    pub const LIMIT_APP_OTHER: &'static str = "other";

    /// An immediate-reject QPS rule, the most common shape.
    #[must_use]
    pub fn new(resource: &str, count: f64) -> Self {
        Self {
            resource: resource.to_owned(),
            count,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_limit_app(mut self, limit_app: &str) -> Self {
        self.limit_app = limit_app.to_owned();
        self
    }

    #[must_use]
    pub fn with_grade(mut self, grade: FlowGrade) -> Self {
        self.grade = grade;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: RelationStrategy, ref_resource: &str) -> Self {
        self.strategy = strategy;
        self.ref_resource = ref_resource.to_owned();
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, max_queueing_time_ms: u32) -> Self {
        self.control_behavior = ControlBehavior::RateLimit;
        self.max_queueing_time_ms = max_queueing_time_ms;
        self
    }

    #[must_use]
    pub fn with_warm_up(mut self, warm_up_period_sec: u32) -> Self {
        self.control_behavior = ControlBehavior::WarmUp;
        self.warm_up_period_sec = warm_up_period_sec;
        self
    }

    /// Why the rule cannot be enforced, or `None` when it is usable.
    #[must_use]
    pub fn validation_error(&self) -> Option<String> {
        if self.resource.is_empty() {
            return Some("resource must not be empty".into());
        }
        if self.limit_app.is_empty() {
            return Some("limit_app must not be empty".into());
        }
        if !self.count.is_finite() || self.count < 0.0 {
            return Some(format!("count {} must be finite and non-negative", self.count));
        }
        if self.control_behavior == ControlBehavior::WarmUp
            && (self.warm_up_period_sec == 0 || self.count <= 0.0)
        {
            return Some("warm-up rules need warm_up_period_sec > 0 and count > 0".into());
        }
        if matches!(
            self.strategy,
            RelationStrategy::Relate | RelationStrategy::Chain
        ) && self.ref_resource.is_empty()
        {
            return Some("relate/chain rules need ref_resource".into());
        }
        None
    }
}
