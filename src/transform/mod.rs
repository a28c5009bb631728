//! Transform pipeline
//!
//! Ordered `set` / `append` / `delete` operations that render a template and
//! write the result into a request or response.
//!
//! # Overview
//!
//! - `Transformable` - URL, headers and body being transformed
//! - `Target` - `body.*`, `header.*`, `url.params.*` or `url.value`
//! - `Namespace` - request, pagination or response; decides which targets are legal
//! - `TransformRegistry` - constructor table used to compile transform lists
//!
//! | Namespace  | body | header | url.params | url.value |
//! |------------|------|--------|------------|-----------|
//! | request    | yes  | yes    | yes        | no        |
//! | pagination | yes  | yes    | yes        | set only  |
//! | response   | yes  | no     | no         | no        |

mod ops;
mod path;
mod registry;
mod types;

pub use ops::{run_all, Transform, TransformKind};
pub use path::{delete_path, get_path, put_path};
pub use registry::TransformRegistry;
pub use types::{Namespace, Target, TransformConfig, TransformSpec, Transformable, ValueType};

#[cfg(test)]
mod tests;
