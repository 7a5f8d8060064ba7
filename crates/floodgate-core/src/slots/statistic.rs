//! Counts every admission outcome.

use std::sync::Arc;

use crate::context::Context;
use crate::resource::ResourceWrapper;
use crate::slots::{Downstream, ProcessorSlot, SlotInterrupt, SlotResult};
use crate::time::Clock;

/// Feeds the statistics runtime.
///
/// Fires the rest of the pipeline first, then records the outcome: pass and
/// concurrency on success, block counts on rejection, and on exit the
/// response time and success counts. A priority wait is converted back into
/// a normal admission here; the pass it represents was already pledged
/// against the future window by the controller.
pub struct StatisticSlot {
    clock: Arc<dyn Clock>,
    max_rt_ms: u64,
}

impl StatisticSlot {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, max_rt_ms: u64) -> Self {
        Self { clock, max_rt_ms }
    }
}

impl ProcessorSlot for StatisticSlot {
    fn entry(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        prioritized: bool,
        downstream: Downstream<'_>,
    ) -> SlotResult {
        match downstream.fire_entry(ctx, resource, count, prioritized) {
            Ok(()) => {
                if let Some(node) = ctx.cur_node() {
                    node.increase_thread_num();
                    node.add_pass_request(count);
                }
                if let Some(origin_node) = ctx.origin_node() {
                    origin_node.increase_thread_num();
                    origin_node.add_pass_request(count);
                }
                Ok(())
            }
            Err(SlotInterrupt::PriorityWait { wait_ms }) => {
                // Already paid for in a future window; only the concurrency
                // gauge moves now.
                if let Some(node) = ctx.cur_node() {
                    node.increase_thread_num();
                }
                if let Some(origin_node) = ctx.origin_node() {
                    origin_node.increase_thread_num();
                }
                ctx.set_queued_ms(wait_ms);
                Ok(())
            }
            Err(SlotInterrupt::Block(block)) => {
                ctx.set_block_error(block.clone());
                if let Some(node) = ctx.cur_node() {
                    node.increase_block(count);
                }
                if let Some(origin_node) = ctx.origin_node() {
                    origin_node.increase_block(count);
                }
                Err(SlotInterrupt::Block(block))
            }
        }
    }

    fn exit(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        downstream: Downstream<'_>,
    ) {
        // A blocked entry never incremented pass or concurrency; there is
        // nothing to finalise for it.
        if ctx.block_error().is_none() {
            let rt = ctx
                .cur_entry_created_ms()
                .map_or(0, |created| self.clock.now_ms().saturating_sub(created))
                .min(self.max_rt_ms);
            let business_error = ctx.cur_entry_has_business_error();
            if let Some(node) = ctx.cur_node() {
                if business_error {
                    node.increase_exception(count);
                }
                node.add_rt_and_success(rt, count);
                node.decrease_thread_num();
            }
            if let Some(origin_node) = ctx.origin_node() {
                if business_error {
                    origin_node.increase_exception(count);
                }
                origin_node.add_rt_and_success(rt, count);
                origin_node.decrease_thread_num();
            }
        }
        downstream.fire_exit(ctx, resource, count);
    }
}
