//! Event publishing
//!
//! Every event produced by an input is handed to a [`Publisher`] together
//! with the cursor as it stood when the event was emitted.
//!
//! # Overview
//!
//! - `StdoutPublisher` - NDJSON on stdout, used by the CLI
//! - `ChannelPublisher` - forwards events into a tokio channel
//! - `CollectingPublisher` - keeps events in memory

mod sinks;
mod types;

pub use sinks::{ChannelPublisher, CollectingPublisher, StdoutPublisher};
pub use types::{Event, Publisher};
