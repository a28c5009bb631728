//! Pagination module
//!
//! Supports: response header links, transform-driven body pagination
//!
//! # Overview
//!
//! After each page the engine asks the configured paginator for the next
//! request. Header pagination pulls the next URL out of a response header
//! with a regular expression. Body pagination runs the pagination transform
//! list over a copy of the last request, reading the last response and the
//! last event from the transform context.
//!
//! Both stop on their own loop guard: a next request identical to the one
//! just sent ends pagination.

mod strategies;
mod types;

pub use strategies::{BodyPaginator, HeaderPaginator, NoPaginator};
pub use types::{HeaderPaginationConfig, NextPage, Pagination, PaginationConfig, Paginator};
