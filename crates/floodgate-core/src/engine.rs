//! The host-facing engine.
//!
//! One [`Engine`] owns everything the pipeline shares: the per-resource slot
//! chains, the cluster node registry, the context entrances under the
//! process root, and the flow rule manager. Hosts construct it once through
//! the builder, clone it freely (cheap handle), and drive admissions with
//! [`Engine::entry`] / [`Context::exit`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::EngineConfig;
use crate::context::Context;
use crate::entry::Entry;
use crate::error::{BlockError, EngineError};
use crate::flow::{FlowRule, FlowRuleManager, FlowSlot};
use crate::node::{ClusterNode, ClusterNodeRegistry, EntranceNode, MetricNode};
use crate::resource::ResourceWrapper;
use crate::slots::{
    ClusterBuilderSlot, LogSlot, NodeSelectorSlot, ProcessorSlot, SlotChain, SlotInterrupt,
    StatisticSlot,
};
use crate::time::{Clock, Sleeper, SystemClock, SystemSleeper};

/// Name of the shared root every entrance node hangs under.
pub const ROOT_CONTEXT_NAME: &str = "machine-root";

/// Configures and builds an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    extra_slots: Vec<Arc<dyn ProcessorSlot>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(SystemSleeper),
            extra_slots: Vec::new(),
        }
    }
}

impl EngineBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn occupy_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.occupy_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn max_rt_ms(mut self, max_rt_ms: u64) -> Self {
        self.config.max_rt_ms = max_rt_ms;
        self
    }

    #[must_use]
    pub fn cold_factor(mut self, cold_factor: u32) -> Self {
        self.config.cold_factor = cold_factor;
        self
    }

    /// Append a host slot to run after the built-in pipeline.
    #[must_use]
    pub fn slot(mut self, slot: Arc<dyn ProcessorSlot>) -> Self {
        self.extra_slots.push(slot);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        self.config.validate()?;
        Ok(Engine::from_parts(
            self.config,
            self.clock,
            self.sleeper,
            self.extra_slots,
        ))
    }
}

struct EngineInner {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    clusters: Arc<ClusterNodeRegistry>,
    rules: Arc<FlowRuleManager>,
    chains: RwLock<Arc<HashMap<Arc<str>, Arc<SlotChain>>>>,
    chain_build_lock: Mutex<()>,
    entrances: Mutex<HashMap<String, Arc<EntranceNode>>>,
    root: Arc<EntranceNode>,
    extra_slots: Vec<Arc<dyn ProcessorSlot>>,
    context_seq: AtomicU64,
}

/// The traffic governance engine. Cloning shares the same state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::from_parts(
            EngineConfig::default(),
            Arc::new(SystemClock),
            Arc::new(SystemSleeper),
            Vec::new(),
        )
    }
}

impl Engine {
    /// An engine with default configuration on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    fn from_parts(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        extra_slots: Vec<Arc<dyn ProcessorSlot>>,
    ) -> Self {
        let clusters = Arc::new(ClusterNodeRegistry::new(
            config.sample_count,
            config.interval_ms,
            Arc::clone(&clock),
        ));
        let rules = Arc::new(FlowRuleManager::new(
            config.occupy_timeout_ms,
            config.cold_factor,
            Arc::clone(&clock),
            sleeper,
        ));
        let root = Arc::new(EntranceNode::new(
            ROOT_CONTEXT_NAME,
            config.sample_count,
            config.interval_ms,
            Arc::clone(&clock),
        ));
        Self {
            inner: Arc::new(EngineInner {
                config,
                clock,
                clusters,
                rules,
                chains: RwLock::new(Arc::new(HashMap::new())),
                chain_build_lock: Mutex::new(()),
                entrances: Mutex::new(HashMap::new()),
                root,
                extra_slots,
                context_seq: AtomicU64::new(0),
            }),
        }
    }

    // ── Contexts ─────────────────────────────────────────────────────────

    /// Establish (or re-enter) the named context with no caller origin.
    #[must_use]
    pub fn enter_context(&self, name: &str) -> Context {
        self.enter_context_with_origin(name, "")
    }

    /// Establish (or re-enter) the named context. Re-entering reuses the
    /// entrance node; the entrance hangs under the shared root.
    #[must_use]
    pub fn enter_context_with_origin(&self, name: &str, origin: &str) -> Context {
        let inner = &self.inner;
        let entrance = {
            let mut entrances = inner.entrances.lock();
            if let Some(existing) = entrances.get(name) {
                Arc::clone(existing)
            } else {
                let entrance = Arc::new(EntranceNode::new(
                    name,
                    inner.config.sample_count,
                    inner.config.interval_ms,
                    Arc::clone(&inner.clock),
                ));
                inner.root.add_child(entrance.as_default_node());
                entrances.insert(name.to_owned(), Arc::clone(&entrance));
                entrance
            }
        };
        let id = inner.context_seq.fetch_add(1, Ordering::AcqRel);
        Context::new(id, Arc::from(name), origin.to_owned(), entrance)
    }

    /// Tear down a context. Fails when entries are still in flight.
    pub fn exit_context(&self, ctx: Context) -> Result<(), EngineError> {
        if ctx.depth() > 0 {
            return Err(EngineError::ContextBusy {
                context: ctx.name().to_owned(),
                outstanding: ctx.depth(),
            });
        }
        Ok(())
    }

    // ── Admissions ───────────────────────────────────────────────────────

    /// Admit one request for `resource`, unprioritized.
    pub fn entry(
        &self,
        ctx: &mut Context,
        resource: impl Into<ResourceWrapper>,
    ) -> Result<Entry, BlockError> {
        self.entry_with(ctx, resource, 1, false)
    }

    /// Admit `count` tokens for `resource`. Prioritized QPS admissions may
    /// pre-pay a future window instead of rejecting; the returned entry then
    /// carries the waited milliseconds.
    pub fn entry_with(
        &self,
        ctx: &mut Context,
        resource: impl Into<ResourceWrapper>,
        count: u32,
        prioritized: bool,
    ) -> Result<Entry, BlockError> {
        let resource = resource.into();
        let chain = self.chain_for(&resource);
        let created_ms = self.inner.clock.now_ms();
        let seq = ctx.push_frame(resource.clone(), count, created_ms, Arc::clone(&chain));

        match chain.entry(ctx, &resource, count, prioritized) {
            Ok(()) => {
                let queued_ms = ctx.cur_frame().and_then(|f| f.queued_ms);
                Ok(Entry::new(
                    ctx.id(),
                    seq,
                    resource,
                    count,
                    created_ms,
                    queued_ms,
                ))
            }
            Err(SlotInterrupt::Block(block)) => {
                // The statistic stage already counted the block; unwind the
                // slots whose entries completed, then drop the frame.
                chain.exit(ctx, &resource, count);
                ctx.pop_frame();
                Err(block)
            }
            Err(SlotInterrupt::PriorityWait { wait_ms }) => {
                // Reachable only when no statistic stage absorbed the wait.
                ctx.set_queued_ms(wait_ms);
                Ok(Entry::new(
                    ctx.id(),
                    seq,
                    resource,
                    count,
                    created_ms,
                    Some(wait_ms),
                ))
            }
        }
    }

    // ── Rules ────────────────────────────────────────────────────────────

    pub fn load_flow_rules(&self, rules: Vec<FlowRule>) {
        self.inner.rules.load_rules(rules);
    }

    #[must_use]
    pub fn flow_rules(&self) -> Vec<Arc<FlowRule>> {
        self.inner.rules.flow_rules()
    }

    // ── Observation ──────────────────────────────────────────────────────

    #[must_use]
    pub fn cluster_node(&self, resource: &str) -> Option<Arc<ClusterNode>> {
        self.inner.clusters.get(resource)
    }

    #[must_use]
    pub fn root_node(&self) -> Arc<EntranceNode> {
        Arc::clone(&self.inner.root)
    }

    #[must_use]
    pub fn entrance_node(&self, context_name: &str) -> Option<Arc<EntranceNode>> {
        self.inner.entrances.lock().get(context_name).cloned()
    }

    /// Minute-level metric snapshots for one resource, oldest first.
    #[must_use]
    pub fn metrics(&self, resource: &str) -> Vec<MetricNode> {
        self.cluster_node(resource)
            .map(|node| node.metric_nodes(resource))
            .unwrap_or_default()
    }

    // ── Pipeline ─────────────────────────────────────────────────────────

    fn chain_for(&self, resource: &ResourceWrapper) -> Arc<SlotChain> {
        let inner = &self.inner;
        if let Some(chain) = inner.chains.read().get(resource.name()) {
            return Arc::clone(chain);
        }
        let _guard = inner.chain_build_lock.lock();
        if let Some(chain) = inner.chains.read().get(resource.name()) {
            return Arc::clone(chain);
        }

        let mut slots: Vec<Arc<dyn ProcessorSlot>> = vec![
            Arc::new(NodeSelectorSlot::new(
                inner.config.sample_count,
                inner.config.interval_ms,
                Arc::clone(&inner.clock),
            )),
            Arc::new(ClusterBuilderSlot::new(Arc::clone(&inner.clusters))),
            Arc::new(LogSlot),
            Arc::new(StatisticSlot::new(
                Arc::clone(&inner.clock),
                inner.config.max_rt_ms,
            )),
            Arc::new(FlowSlot::new(
                Arc::clone(&inner.rules),
                Arc::clone(&inner.clusters),
            )),
        ];
        slots.extend(inner.extra_slots.iter().map(Arc::clone));
        let chain = Arc::new(SlotChain::new(slots));

        let current = Arc::clone(&inner.chains.read());
        let mut replacement = HashMap::with_capacity(current.len() + 1);
        replacement.extend(current.iter().map(|(k, v)| (Arc::clone(k), Arc::clone(v))));
        replacement.insert(resource.name_shared(), Arc::clone(&chain));
        *inner.chains.write() = Arc::new(replacement);
        chain
    }
}
