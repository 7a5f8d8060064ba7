//! Polling file-backed rule source.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::json::decode_rules;
use crate::RuleSink;

/// Re-reads a rule file on an interval from a background thread and pushes
/// decoded rules into the sink.
///
/// Unchanged file content is skipped by comparing raw bytes. Read or decode
/// failures are logged and the loop keeps polling; a broken edit never tears
/// the source down. Dropping the handle stops the poller.
pub struct FileRuleSource {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FileRuleSource {
    /// Start polling `path` every `poll_interval`. The first read happens
    /// immediately.
    #[must_use]
    pub fn spawn(
        path: impl Into<PathBuf>,
        poll_interval: Duration,
        sink: Arc<dyn RuleSink>,
    ) -> Self {
        let path = path.into();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let worker = std::thread::spawn(move || {
            let mut last_content: Option<Vec<u8>> = None;
            while !stop_flag.load(Ordering::Acquire) {
                poll_once(&path, &mut last_content, sink.as_ref());
                std::thread::sleep(poll_interval);
            }
        });
        Self {
            stop,
            worker: Some(worker),
        }
    }

    /// Stop the poller and wait for the worker to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for FileRuleSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll_once(path: &Path, last_content: &mut Option<Vec<u8>>, sink: &dyn RuleSink) {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "rule file read failed");
            return;
        }
    };
    if last_content.as_ref() == Some(&content) {
        return;
    }
    match std::str::from_utf8(&content).map_err(|e| e.to_string()) {
        Ok(raw) => match decode_rules(raw) {
            Ok(rules) => {
                tracing::info!(
                    path = %path.display(),
                    rules = rules.len(),
                    "rule file changed, applying"
                );
                sink.apply_flow_rules(rules);
                *last_content = Some(content);
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "rule file decode failed");
            }
        },
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "rule file is not valid UTF-8");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::sync::Mutex;

    use floodgate_core::FlowRule;

    #[derive(Default)]
    struct RecordingSink {
        applied: Mutex<Vec<Vec<FlowRule>>>,
    }

    impl RuleSink for RecordingSink {
        fn apply_flow_rules(&self, rules: Vec<FlowRule>) {
            self.applied.lock().expect("sink lock").push(rules);
        }
    }

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
    fn applies_initial_content_and_later_edits() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, r#"[{{"resource": "/a", "count": 10}}]"#).expect("write rules");

        let sink = Arc::new(RecordingSink::default());
        let source = FileRuleSource::spawn(
            file.path(),
            Duration::from_millis(10),
            Arc::clone(&sink) as Arc<dyn RuleSink>,
        );

        wait_for(|| !sink.applied.lock().expect("sink lock").is_empty());
        assert_eq!(sink.applied.lock().expect("sink lock")[0][0].resource, "/a");

        // Rewrite the file; the poller picks the change up.
        std::fs::write(file.path(), r#"[{"resource": "/b", "count": 5}]"#)
            .expect("rewrite rules");
        wait_for(|| sink.applied.lock().expect("sink lock").len() >= 2);
        let applied = sink.applied.lock().expect("sink lock");
        assert_eq!(applied.last().expect("at least two loads")[0].resource, "/b");
        drop(applied);

        source.stop();
    }

    #[test]
    fn unchanged_content_is_not_reapplied() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, r#"[{{"resource": "/a", "count": 10}}]"#).expect("write rules");

        let sink = Arc::new(RecordingSink::default());
        let source = FileRuleSource::spawn(
            file.path(),
            Duration::from_millis(5),
            Arc::clone(&sink) as Arc<dyn RuleSink>,
        );

        wait_for(|| !sink.applied.lock().expect("sink lock").is_empty());
        // Give the poller several more cycles over identical content.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.applied.lock().expect("sink lock").len(), 1);

        source.stop();
    }

    #[test]
    fn broken_edits_keep_the_last_good_rules() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, r#"[{{"resource": "/a", "count": 10}}]"#).expect("write rules");

        let sink = Arc::new(RecordingSink::default());
        let source = FileRuleSource::spawn(
            file.path(),
            Duration::from_millis(5),
            Arc::clone(&sink) as Arc<dyn RuleSink>,
        );
        wait_for(|| !sink.applied.lock().expect("sink lock").is_empty());

        // A malformed edit is logged and skipped, not applied.
        std::fs::write(file.path(), "not json").expect("break the file");
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.applied.lock().expect("sink lock").len(), 1);

        // Fixing the file resumes loading.
        std::fs::write(file.path(), r#"[{"resource": "/c", "count": 1}]"#)
            .expect("fix the file");
        wait_for(|| sink.applied.lock().expect("sink lock").len() >= 2);

        source.stop();
    }
}
