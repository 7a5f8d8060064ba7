//! Host-provided pipeline stages.

use std::sync::Arc;

use floodgate_core::slots::{Downstream, ProcessorSlot, SlotInterrupt, SlotResult};
use floodgate_core::{BlockError, BlockKind, Context, Engine, ResourceWrapper};

/// Denies every admission to one resource, the way an authority stage would.
struct DenyResource {
    resource: String,
}

impl ProcessorSlot for DenyResource {
    fn entry(
        &self,
        ctx: &mut Context,
        resource: &ResourceWrapper,
        count: u32,
        prioritized: bool,
        downstream: Downstream<'_>,
    ) -> SlotResult {
        if resource.name() == self.resource {
            return Err(SlotInterrupt::Block(BlockError::new(
                BlockKind::Authority,
                Arc::from(resource.name()),
                ctx.origin().to_owned(),
            )));
        }
        downstream.fire_entry(ctx, resource, count, prioritized)
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

#[test]
fn appended_host_slot_participates_in_the_pipeline() {
    let engine = Engine::builder()
        .slot(Arc::new(DenyResource {
            resource: "/admin".to_owned(),
        }))
        .build()
        .expect("default configuration builds");

    let mut ctx = engine.enter_context("web-entry");

    let block = engine.entry(&mut ctx, "/admin").expect_err("denied by the host slot");
    assert_eq!(block.kind(), BlockKind::Authority);

    // The statistic stage upstream of the host slot counted the rejection.
    let cluster = engine.cluster_node("/admin").expect("cluster node exists");
    assert_eq!(cluster.block_request(), 1);
    assert_eq!(cluster.cur_thread_num(), 0);

    // Other resources are untouched.
    let entry = engine.entry(&mut ctx, "/public").expect("allowed elsewhere");
    ctx.exit(entry).expect("paired exit");
}
