//! Behavioral tests for the admission pipeline and the reject controller.
//!
//! All scenarios run on the manual clock and sleeper, so nothing here
//! performs a real wait.

use std::sync::Arc;

use floodgate_core::time::{Clock, ManualClock, ManualSleeper, Sleeper};
use floodgate_core::{
    BlockKind, Engine, FlowGrade, FlowRule, RelationStrategy,
};

fn engine_at(start_ms: u64) -> (Arc<ManualClock>, Arc<ManualSleeper>, Engine) {
    let clock = Arc::new(ManualClock::new(start_ms));
    let sleeper = Arc::new(ManualSleeper::new(Arc::clone(&clock)));
    let engine = Engine::builder()
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .sleeper(Arc::clone(&sleeper) as Arc<dyn Sleeper>)
        .build()
        .expect("default configuration builds");
    (clock, sleeper, engine)
}

// ============================================================================
// Reject path
// ============================================================================

#[test]
fn qps_threshold_admits_exactly_the_budget() {
    let (clock, _sleeper, engine) = engine_at(1_000_000);
    engine.load_flow_rules(vec![FlowRule::new("/r", 2.0)]);

    let mut ctx = engine.enter_context("web-entry");
    let mut admitted = 0;
    let mut blocked = 0;
    // Five requests inside 100 ms.
    for _ in 0..5 {
        match engine.entry(&mut ctx, "/r") {
            Ok(entry) => {
                admitted += 1;
                ctx.exit(entry).expect("paired exit");
            }
            Err(block) => {
                assert_eq!(block.kind(), BlockKind::Flow);
                assert_eq!(block.resource(), "/r");
                assert!(block.triggered_rule().is_some());
                blocked += 1;
            }
        }
        clock.advance(20);
    }

    assert_eq!(admitted, 2);
    assert_eq!(blocked, 3);

    let cluster = engine.cluster_node("/r").expect("cluster node exists");
    assert!((cluster.pass_qps() - 2.0).abs() < f64::EPSILON);
    assert!((cluster.block_qps() - 3.0).abs() < f64::EPSILON);
    assert_eq!(cluster.total_request(), 5);
    assert_eq!(cluster.total_pass(), 2);
    assert_eq!(cluster.block_request(), 3);
}

#[test]
fn thread_threshold_tracks_in_flight_entries() {
    let (_clock, _sleeper, engine) = engine_at(1_000_000);
    engine.load_flow_rules(vec![FlowRule::new("/r", 1.0).with_grade(FlowGrade::Thread)]);

    let mut ctx = engine.enter_context("web-entry");
    let held = engine.entry(&mut ctx, "/r").expect("first admission");
    // A nested request of the same resource exceeds the concurrency budget.
    assert!(engine.entry(&mut ctx, "/r").is_err());

    ctx.exit(held).expect("paired exit");
    // With the first one gone the budget is free again.
    let again = engine.entry(&mut ctx, "/r").expect("budget freed");
    ctx.exit(again).expect("paired exit");
}

// ============================================================================
// Caller partition
// ============================================================================

#[test]
fn origin_scoped_rule_leaves_other_callers_alone() {
    let (_clock, _sleeper, engine) = engine_at(1_000_000);
    engine.load_flow_rules(vec![FlowRule::new("/r", 1.0).with_limit_app("svc-a")]);

    let mut ctx_a = engine.enter_context_with_origin("rpc-entry-a", "svc-a");
    let mut ctx_b = engine.enter_context_with_origin("rpc-entry-b", "svc-b");

    let first = engine.entry(&mut ctx_a, "/r").expect("first svc-a admission");
    ctx_a.exit(first).expect("paired exit");
    // Second svc-a request exceeds the per-caller budget.
    assert!(engine.entry(&mut ctx_a, "/r").is_err());

    // svc-b is not named by the rule and passes freely.
    for _ in 0..3 {
        let entry = engine.entry(&mut ctx_b, "/r").expect("svc-b unaffected");
        ctx_b.exit(entry).expect("paired exit");
    }

    let cluster = engine.cluster_node("/r").expect("cluster node exists");
    let svc_a = cluster.origin_node("svc-a").expect("svc-a partition");
    assert_eq!(svc_a.total_pass(), 1);
    assert_eq!(svc_a.block_request(), 1);
    assert_eq!(cluster.total_pass(), 4);
}

#[test]
fn other_rule_spares_explicitly_named_callers() {
    let (_clock, _sleeper, engine) = engine_at(1_000_000);
    engine.load_flow_rules(vec![
        FlowRule::new("/r", 100.0).with_limit_app("svc-a"),
        FlowRule::new("/r", 1.0).with_limit_app(FlowRule::LIMIT_APP_OTHER),
    ]);

    let mut ctx_a = engine.enter_context_with_origin("entry-a", "svc-a");
    let mut ctx_b = engine.enter_context_with_origin("entry-b", "svc-b");

    // svc-b falls under "other": the shared budget is one request.
    let b1 = engine.entry(&mut ctx_b, "/r").expect("first other admission");
    ctx_b.exit(b1).expect("paired exit");
    assert!(engine.entry(&mut ctx_b, "/r").is_err());

    // svc-a is explicitly named elsewhere and escapes the "other" rule.
    for _ in 0..3 {
        let entry = engine.entry(&mut ctx_a, "/r").expect("svc-a has its own budget");
        ctx_a.exit(entry).expect("paired exit");
    }
}

// ============================================================================
// Relation strategies
// ============================================================================

#[test]
fn relate_rule_throttles_against_the_reference_resource() {
    let (_clock, _sleeper, engine) = engine_at(1_000_000);
    engine.load_flow_rules(vec![
        FlowRule::new("/read", 1.0).with_strategy(RelationStrategy::Relate, "/write")
    ]);

    let mut ctx = engine.enter_context("web-entry");

    // No /write traffic yet: reads flow.
    let read = engine.entry(&mut ctx, "/read").expect("read admitted");
    ctx.exit(read).expect("paired exit");

    // Drive /write traffic past the reference threshold.
    let w1 = engine.entry(&mut ctx, "/write").expect("write admitted");
    ctx.exit(w1).expect("paired exit");

    // The read rule now measures /write's cluster node and rejects.
    assert!(engine.entry(&mut ctx, "/read").is_err());
}

#[test]
fn chain_rule_applies_only_inside_its_entrance() {
    let (_clock, _sleeper, engine) = engine_at(1_000_000);
    engine.load_flow_rules(vec![
        FlowRule::new("/r", 1.0).with_strategy(RelationStrategy::Chain, "batch-entry")
    ]);

    let mut batch = engine.enter_context("batch-entry");
    let mut web = engine.enter_context("web-entry");

    let b1 = engine.entry(&mut batch, "/r").expect("first batch admission");
    batch.exit(b1).expect("paired exit");
    assert!(engine.entry(&mut batch, "/r").is_err());

    // The same resource through another entrance is not chained.
    for _ in 0..3 {
        let entry = engine.entry(&mut web, "/r").expect("web entrance unchained");
        web.exit(entry).expect("paired exit");
    }
}

// ============================================================================
// Priority occupancy
// ============================================================================

#[test]
fn prioritized_request_prepays_the_next_window() {
    let (clock, sleeper, engine) = engine_at(1_000_000);
    engine.load_flow_rules(vec![FlowRule::new("/r", 5.0)]);

    let mut ctx = engine.enter_context("web-entry");
    // One pass in the first bucket, four in the second.
    let e = engine.entry(&mut ctx, "/r").expect("admitted");
    ctx.exit(e).expect("paired exit");
    clock.advance(500);
    for _ in 0..4 {
        let e = engine.entry(&mut ctx, "/r").expect("admitted");
        ctx.exit(e).expect("paired exit");
    }
    clock.advance(100);

    // The interval is full; an unprioritized request is rejected.
    assert!(engine.entry(&mut ctx, "/r").is_err());

    // A prioritized one sleeps to the next window turn, where the first
    // bucket's pass retires, and is admitted.
    let entry = engine
        .entry_with(&mut ctx, "/r", 1, true)
        .expect("priority admission");
    assert_eq!(entry.queued_ms(), Some(400));
    assert_eq!(sleeper.recorded(), vec![400]);
    assert_eq!(clock.now_ms(), 1_001_000);
    ctx.exit(entry).expect("paired exit");

    // Its pre-paid pass weighs against the threshold: four passes from the
    // live bucket plus the occupied one leave no room.
    assert!(engine.entry(&mut ctx, "/r").is_err());

    let cluster = engine.cluster_node("/r").expect("cluster node exists");
    assert_eq!(cluster.total_pass(), 6);
}
