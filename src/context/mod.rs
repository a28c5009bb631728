//! Transform context and cursor
//!
//! # Overview
//!
//! - `TransformContext` - cursor plus first/last event and response of one interval
//! - `ResponseSnapshot` - status, headers, URL, decoded body and page index
//! - `Cursor` - named templates recomputed after each page and persisted per interval

mod cursor;
mod types;

pub use cursor::{Cursor, CursorEntry};
pub use types::{ResponseSnapshot, TransformContext};
