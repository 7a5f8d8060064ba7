//! Floodgate Datasource - external rule loading
//!
//! Bridges external rule storage to a running engine:
//!
//! - **Wire format**: JSON array of camelCase rule objects, unknown keys
//!   ignored, missing fields defaulted
//! - **File source**: a background poller that re-reads a rule file and
//!   pushes changed content into a [`RuleSink`]

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod file;
mod json;

pub use file::FileRuleSource;
pub use json::{decode_rules, encode_rules};

use floodgate_core::{Engine, FlowRule};
use thiserror::Error;

/// Failures while fetching or decoding rules.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("failed to read rule source: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode rules: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Where freshly loaded rules go.
pub trait RuleSink: Send + Sync {
    fn apply_flow_rules(&self, rules: Vec<FlowRule>);
}

impl RuleSink for Engine {
    fn apply_flow_rules(&self, rules: Vec<FlowRule>) {
        self.load_flow_rules(rules);
    }
}
