//! Split engine
//!
//! Turns one response body into zero or more event bodies by walking a
//! chain of split nodes.
//!
//! # Overview
//!
//! - `array` - one event per element of a list
//! - `map` - one event per entry of an object, optionally recording the key
//! - `string` - one event per piece of a delimited string
//!
//! Each node can keep the parent document (folding the element back under
//! its target) and hand the result to a nested split. Every branch works on
//! its own deep copy of the parent, so siblings never see each other's
//! transforms.

mod engine;
mod types;

pub use engine::Split;
pub use types::{SplitConfig, SplitKind};
