//! End-to-end: rule file feeding a live engine.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use floodgate_core::Engine;
use floodgate_datasource::{FileRuleSource, RuleSink};

fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached within the deadline");
}

#[test]
fn file_rules_govern_engine_admissions() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    // A zero budget rejects every admission, deterministically.
    writeln!(file, r#"[{{"resource": "/frozen", "count": 0}}]"#).expect("write rules");

    let engine = Engine::new();
    let source = FileRuleSource::spawn(
        file.path(),
        Duration::from_millis(10),
        Arc::new(engine.clone()) as Arc<dyn RuleSink>,
    );
    wait_for(|| !engine.flow_rules().is_empty());

    let mut ctx = engine.enter_context("web-entry");
    assert!(engine.entry(&mut ctx, "/frozen").is_err());

    // Resources without rules stay ungoverned.
    let entry = engine.entry(&mut ctx, "/open").expect("ungoverned resource");
    ctx.exit(entry).expect("paired exit");

    // Lifting the rule unfreezes the resource.
    std::fs::write(file.path(), r#"[{"resource": "/frozen", "count": 100}]"#)
        .expect("rewrite rules");
    wait_for(|| {
        engine
            .flow_rules()
            .first()
            .is_some_and(|rule| rule.count > 0.0)
    });
    let entry = engine.entry(&mut ctx, "/frozen").expect("budget raised");
    ctx.exit(entry).expect("paired exit");
}
