//! Floodgate Core - In-process traffic governance
//!
//! This crate is an in-process admission interceptor: every request enters a
//! per-resource slot pipeline on its own thread and is admitted, shaped, or
//! rejected according to the flow rules attached to that resource.
//!
//! - **Pipeline**: node selection, cluster binding, block logging,
//!   statistics, flow checking; hosts can append their own slots
//! - **Statistics**: sliding-window counters (QPS, RT, concurrency,
//!   exceptions) per context node and per resource
//! - **Shaping**: immediate reject with priority occupancy, leaky-bucket
//!   uniform pacing, and warm-up token bucket
//!
//! # Quick Start
//!
//! ```rust
//! use floodgate_core::{Engine, FlowRule};
//!
//! let engine = Engine::new();
//! engine.load_flow_rules(vec![FlowRule::new("/orders", 100.0)]);
//!
//! let mut ctx = engine.enter_context("web-entry");
//! match engine.entry(&mut ctx, "/orders") {
//!     Ok(entry) => {
//!         // protected work runs here
//!         ctx.exit(entry).expect("exits pair with entries");
//!     }
//!     Err(block) => {
//!         // shed load: the request was rejected by a rule
//!         let _ = block;
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

mod config;
mod context;
mod engine;
mod entry;
mod error;
pub mod flow;
pub mod node;
mod resource;
pub mod slots;
pub mod stat;
pub mod time;

pub use config::EngineConfig;
pub use context::Context;
pub use engine::{Engine, EngineBuilder, ROOT_CONTEXT_NAME};
pub use entry::Entry;
pub use error::{BlockError, BlockKind, EngineError};
pub use flow::{ControlBehavior, FlowGrade, FlowRule, RelationStrategy};
pub use resource::{ResourceType, ResourceWrapper, TrafficType};
