//! Records rejected admissions.

use crate::context::Context;
use crate::resource::ResourceWrapper;
use crate::slots::{Downstream, ProcessorSlot, SlotInterrupt, SlotResult};

/// Observes typed blocks flowing outward and logs them before re-raising.
#[derive(Debug, Default)]
pub struct LogSlot;

impl ProcessorSlot for LogSlot {
    fn entry(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        prioritized: bool,
        downstream: Downstream<'_>,
    ) -> SlotResult {
        let outcome = downstream.fire_entry(ctx, resource, count, prioritized);
        if let Err(SlotInterrupt::Block(block)) = &outcome {
            tracing::debug!(
                resource = resource.name(),
                kind = %block.kind(),
                origin = ctx.origin(),
                context = ctx.name(),
                "admission blocked"
            );
        }
        outcome
    }

    fn exit(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        downstream: Downstream<'_>,
    ) {
        downstream.fire_exit(ctx, resource, count);
    }
}
