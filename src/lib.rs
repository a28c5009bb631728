// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Poller
//!
//! A configuration-driven HTTP JSON polling engine. Each source polls an API
//! on an interval and turns its responses into a stream of events, keeping a
//! cursor so the next interval resumes where the last one stopped.
//!
//! ## Features
//!
//! - **Templates**: `[[ ]]` expressions compute URLs, headers, bodies and
//!   cursor values from the last response and the last event
//! - **Transforms**: `set` / `append` / `delete` on request, pagination and
//!   response documents
//! - **Split**: break one response into many events (array, map, string)
//! - **Pagination**: body transforms or a `Link`-style response header
//! - **Chains**: dependent requests built from ids in earlier responses
//! - **Resilience**: retries with backoff, header driven rate limiting,
//!   Basic and OAuth2 (default, Azure, Google) auth
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_poller::engine::Input;
//! use solidafy_poller::loader::load_source_from_file;
//! use solidafy_poller::publisher::StdoutPublisher;
//! use solidafy_poller::state::MemoryCheckpointStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> solidafy_poller::Result<()> {
//!     let source = load_source_from_file("source.yaml")?;
//!     let mut input = Input::new(
//!         source,
//!         Arc::new(MemoryCheckpointStore::new()),
//!         Arc::new(StdoutPublisher::new()),
//!     )?;
//!     input.run(CancellationToken::new()).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Input (one per source)                   │
//! │   timer → request → pages → chain → split → publish → cursor     │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//! ┌──────────┬───────────┬────────┴──────┬───────────┬──────────────┐
//! │ Template │ Transform │  Pagination   │   Split   │  Checkpoint  │
//! ├──────────┼───────────┼───────────────┼───────────┼──────────────┤
//! │ [[ ]]    │ set       │ Body          │ Array     │ File         │
//! │ Functions│ append    │ Header        │ Map       │ Memory       │
//! │          │ delete    │               │ String    │              │
//! └──────────┴───────────┴───────────────┴───────────┴──────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the poller
pub mod error;

/// Common types and type aliases
pub mod types;

/// Authentication implementations
pub mod auth;

/// Value templates
pub mod template;

/// Per-interval transform context and cursor
pub mod context;

/// Set / append / delete transforms
pub mod transform;

/// Response splitting
pub mod split;

/// Pagination strategies
pub mod pagination;

/// HTTP client with retry and rate limiting
pub mod http;

/// Response decoders and request encoders
pub mod decode;

/// Checkpoint stores
pub mod state;

/// Event publishers
pub mod publisher;

/// Input metrics
pub mod metrics;

/// Request/response trace log
pub mod tracer;

/// Polling engine
pub mod engine;

/// YAML loader for source definitions
pub mod loader;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use engine::{Input, SourceConfig};
pub use loader::{load_source_from_file, load_source_from_str, SourceDefinition};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
