//! Execution engine module
//!
//! Runs a compiled source: requests, pagination, chains, publishing and
//! cursor checkpoints.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SourceConfig` - A source definition compiled and validated
//! - `Input` - The polling worker; `run` loops on the interval timer and
//!   `run_once` executes a single interval
//! - `RequestFactory` / `ResponseProcessor` - How one step builds its
//!   requests and turns responses into events
//! - Chain helpers: JSONPath id extraction and `replace_with` resolution
//!
//! Within an interval everything is sequential. Root pages are published in
//! order; when chain steps exist each root page feeds the chain and only the
//! last step publishes.

mod chain;
mod input;
mod request;
mod response;
mod types;

pub use chain::{extract_ids, ReplaceWith};
pub use input::Input;
pub use request::{generate_url, RequestFactory};
pub use response::ResponseProcessor;
pub use types::{ChainKind, ChainStep, IntervalStats, SourceConfig, StepConfig};
