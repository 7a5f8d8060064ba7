//! The per-resource admission pipeline.
//!
//! A [`SlotChain`] is an ordered sequence of [`ProcessorSlot`]s built once
//! per resource and cached. Each slot does its own work and forwards
//! explicitly by firing the [`Downstream`] it was handed, so a slot may act
//! before or after the rest of the pipeline runs. Hosts can append their own
//! slots after the built-in ones.

mod cluster_builder;
mod log_slot;
mod node_selector;
mod statistic;

pub use cluster_builder::ClusterBuilderSlot;
pub use log_slot::LogSlot;
pub use node_selector::NodeSelectorSlot;
pub use statistic::StatisticSlot;

use std::sync::Arc;

use crate::context::Context;
use crate::error::BlockError;
use crate::resource::ResourceWrapper;

/// Non-success outcome of a slot's entry.
#[derive(Debug)]
pub enum SlotInterrupt {
    /// The admission is rejected; the host sees a [`BlockError`].
    Block(BlockError),
    /// The admission was pre-paid against a future window and has already
    /// slept; the statistic stage converts this back into a pass.
    PriorityWait { wait_ms: u64 },
}

pub type SlotResult = Result<(), SlotInterrupt>;

/// One stage of the pipeline.
pub trait ProcessorSlot: Send + Sync {
    /// Process an admission and forward through `downstream`.
    fn entry(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        prioritized: bool,
        downstream: Downstream<'_>,
    ) -> SlotResult;

    /// Observe the completion of an admitted entry and forward.
    fn exit(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        downstream: Downstream<'_>,
    );
}

/// The remainder of the chain after the current slot.
#[derive(Clone, Copy)]
pub struct Downstream<'a> {
    rest: &'a [Arc<dyn ProcessorSlot>],
}

impl Downstream<'_> {
    pub fn fire_entry(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        prioritized: bool,
    ) -> SlotResult {
        match self.rest.split_first() {
            Some((head, rest)) => head.entry(ctx, resource, count, prioritized, Downstream { rest }),
            None => Ok(()),
        }
    }

    pub fn fire_exit(&self, ctx: &mut Context, resource: &ResourceWrapper, count: u32) {
        if let Some((head, rest)) = self.rest.split_first() {
            head.exit(ctx, resource, count, Downstream { rest });
        }
    }
}

/// The ordered pipeline for one resource. Immutable once built.
pub struct SlotChain {
    slots: Vec<Arc<dyn ProcessorSlot>>,
}

impl SlotChain {
    #[must_use]
    pub fn new(slots: Vec<Arc<dyn ProcessorSlot>>) -> Self {
        Self { slots }
    }

    pub fn entry(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        prioritized: bool,
    ) -> SlotResult {
        Downstream { rest: &self.slots }.fire_entry(ctx, resource, count, prioritized)
    }

    pub fn exit(&self, ctx: &mut Context, resource: &ResourceWrapper, count: u32) {
        Downstream { rest: &self.slots }.fire_exit(ctx, resource, count);
    }
}
