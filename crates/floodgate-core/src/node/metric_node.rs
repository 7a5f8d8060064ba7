//! Per-bucket metric snapshot.

use std::fmt;

use chrono::{TimeZone, Utc};
use serde::Serialize;

/// One minute-level bucket rendered for observation.
///
/// Bucket values are per-second figures because minute buckets span one
/// second each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricNode {
    pub timestamp_ms: u64,
    pub resource: String,
    pub pass_qps: u64,
    pub block_qps: u64,
    pub success_qps: u64,
    pub exception_qps: u64,
    pub avg_rt_ms: u64,
    pub concurrency: u32,
}

impl fmt::Display for MetricNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = i64::try_from(self.timestamp_ms)
            .ok()
            .and_then(|ts| Utc.timestamp_millis_opt(ts).single())
            .map_or_else(
                || self.timestamp_ms.to_string(),
                |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            );
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}|{}",
            rendered,
            self.resource,
            self.pass_qps,
            self.block_qps,
            self.success_qps,
            self.exception_qps,
            self.avg_rt_ms,
            self.concurrency
        )
    }
}
