//! Rule storage and compilation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::flow::controller::{
    DefaultController, RateLimiterController, TrafficShaper, WarmUpController,
};
use crate::flow::rule::{ControlBehavior, FlowRule};
use crate::time::{Clock, Sleeper};

/// A validated rule bound to its shaping engine. Compiled exactly once per
/// load so pacing state (virtual queue, token bucket) survives across
/// admissions.
pub struct CompiledFlowRule {
    rule: Arc<FlowRule>,
    shaper: TrafficShaper,
}

impl CompiledFlowRule {
    #[must_use]
    pub fn rule(&self) -> &Arc<FlowRule> {
        &self.rule
    }

    pub(crate) fn shaper(&self) -> &TrafficShaper {
        &self.shaper
    }
}

/// Holds the per-resource rule lists. Reads are snapshot pointers; a load
/// replaces the whole map atomically.
pub struct FlowRuleManager {
    rules: RwLock<Arc<HashMap<String, Arc<Vec<CompiledFlowRule>>>>>,
    occupy_timeout_ms: u64,
    cold_factor: u32,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl FlowRuleManager {
    #[must_use]
    pub fn new(
        occupy_timeout_ms: u64,
        cold_factor: u32,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            rules: RwLock::new(Arc::new(HashMap::new())),
            occupy_timeout_ms,
            cold_factor,
            clock,
            sleeper,
        }
    }

    /// Replace every loaded rule. Invalid rules are skipped with a warning;
    /// the publication itself is a single pointer swap.
    pub fn load_rules(&self, rules: Vec<FlowRule>) {
        let mut grouped: HashMap<String, Vec<CompiledFlowRule>> = HashMap::new();
        let mut accepted = 0usize;
        for rule in rules {
            if let Some(reason) = rule.validation_error() {
                tracing::warn!(resource = %rule.resource, %reason, "skipping invalid flow rule");
                continue;
            }
            accepted += 1;
            grouped
                .entry(rule.resource.clone())
                .or_default()
                .push(self.compile(rule));
        }
        let published: HashMap<String, Arc<Vec<CompiledFlowRule>>> = grouped
            .into_iter()
            .map(|(resource, list)| (resource, Arc::new(list)))
            .collect();
        tracing::info!(
            rules = accepted,
            resources = published.len(),
            "flow rules loaded"
        );
        *self.rules.write() = Arc::new(published);
    }

    fn compile(&self, rule: FlowRule) -> CompiledFlowRule {
        if rule.cluster_mode {
            tracing::debug!(
                resource = %rule.resource,
                "cluster mode is not coordinated; evaluating the rule locally"
            );
        }
        let shaper = match rule.control_behavior {
            ControlBehavior::Reject => TrafficShaper::Default(DefaultController::new(
                rule.count,
                rule.grade,
                self.occupy_timeout_ms,
                Arc::clone(&self.clock),
                Arc::clone(&self.sleeper),
            )),
            ControlBehavior::RateLimit => TrafficShaper::RateLimiter(RateLimiterController::new(
                rule.count,
                u64::from(rule.max_queueing_time_ms),
                Arc::clone(&self.clock),
                Arc::clone(&self.sleeper),
            )),
            ControlBehavior::WarmUp => TrafficShaper::WarmUp(WarmUpController::new(
                rule.count,
                rule.warm_up_period_sec,
                self.cold_factor,
                Arc::clone(&self.clock),
            )),
            ControlBehavior::WarmUpRateLimit => {
                tracing::warn!(
                    resource = %rule.resource,
                    "warm-up rate limiting is not supported; falling back to immediate reject"
                );
                TrafficShaper::Default(DefaultController::new(
                    rule.count,
                    rule.grade,
                    self.occupy_timeout_ms,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.sleeper),
                ))
            }
        };
        CompiledFlowRule {
            rule: Arc::new(rule),
            shaper,
        }
    }

    #[must_use]
    pub fn rules_for(&self, resource: &str) -> Option<Arc<Vec<CompiledFlowRule>>> {
        self.rules.read().get(resource).cloned()
    }

    /// Snapshot of every loaded rule, for observation.
    #[must_use]
    pub fn flow_rules(&self) -> Vec<Arc<FlowRule>> {
        self.rules
            .read()
            .values()
            .flat_map(|list| list.iter().map(|c| Arc::clone(c.rule())))
            .collect()
    }

    /// Whether any rule of `resource` names `origin` explicitly; such
    /// origins are excluded from `"other"` rules.
    #[must_use]
    pub(crate) fn is_origin_named(&self, resource: &str, origin: &str) -> bool {
        self.rules_for(resource).is_some_and(|rules| {
            rules.iter().any(|c| c.rule().limit_app == origin)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::rule::RelationStrategy;
    use crate::time::{ManualClock, ManualSleeper};

    fn manager() -> FlowRuleManager {
        let clock = Arc::new(ManualClock::new(0));
        let sleeper = Arc::new(ManualSleeper::new(Arc::clone(&clock)));
        FlowRuleManager::new(500, 3, clock, sleeper)
    }

    #[test]
    fn load_groups_by_resource_and_skips_invalid() {
        let m = manager();
        m.load_rules(vec![
            FlowRule::new("/a", 10.0),
            FlowRule::new("/a", 5.0).with_limit_app("svc-a"),
            FlowRule::new("/b", 1.0),
            FlowRule::new("", 1.0),
            FlowRule::new("/c", 1.0).with_strategy(RelationStrategy::Relate, ""),
        ]);
        assert_eq!(m.rules_for("/a").expect("rules for /a").len(), 2);
        assert_eq!(m.rules_for("/b").expect("rules for /b").len(), 1);
        assert!(m.rules_for("/c").is_none());
        assert_eq!(m.flow_rules().len(), 3);
    }

    #[test]
    fn reload_replaces_the_whole_rule_set() {
        let m = manager();
        m.load_rules(vec![FlowRule::new("/a", 10.0)]);
        m.load_rules(vec![FlowRule::new("/b", 1.0)]);
        assert!(m.rules_for("/a").is_none());
        assert!(m.rules_for("/b").is_some());
    }

    #[test]
    fn named_origins_are_not_other() {
        let m = manager();
        m.load_rules(vec![
            FlowRule::new("/a", 10.0).with_limit_app("svc-a"),
            FlowRule::new("/a", 1.0).with_limit_app(FlowRule::LIMIT_APP_OTHER),
        ]);
        assert!(m.is_origin_named("/a", "svc-a"));
        assert!(!m.is_origin_named("/a", "svc-b"));
    }
}
