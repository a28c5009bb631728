//! CLI module
//!
//! Command-line interface for running polling sources.
//!
//! # Commands
//!
//! - `run` - Poll every source until Ctrl-C
//! - `once` - Run a single interval of every source
//! - `validate` - Load and validate a source file

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::Runner;
