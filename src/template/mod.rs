//! Value templates
//!
//! Every dynamic value in a source config (URLs, headers, bodies, cursor
//! entries, retry conditions) is a small template with `[[ ... ]]` actions.
//!
//! # Overview
//!
//! - `ValueTemplate::compile` parses once at load time; unknown functions and
//!   syntax errors fail there
//! - `ValueTemplate::execute` renders against a `TransformContext` and the
//!   in-flight `Transformable`, falling back to a default template
//! - Field access on a missing key is an error, not an empty string
//!
//! ```text
//! [[ .last_response.body.next ]]
//! [[ formatDate (now (parseDuration "-1h")) "RFC3339" ]]
//! [[ .last_response.header.Get "X-Next" ]]
//! ```

mod exec;
mod functions;
mod parse;
mod timefmt;
mod value;

pub use exec::ValueTemplate;
pub use functions::user_agent;
pub use timefmt::{format_duration, parse_duration};
pub use value::canonical_header_name;

#[cfg(test)]
mod tests;
