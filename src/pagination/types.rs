//! Pagination types and traits
//!
//! Defines the core pagination abstractions used by all strategies.

use super::strategies::{BodyPaginator, HeaderPaginator, NoPaginator};
use crate::context::TransformContext;
use crate::error::Result;
use crate::transform::{TransformRegistry, TransformSpec, Transformable};
use serde::Deserialize;

/// Result of the next page computation
#[derive(Debug, Clone, PartialEq)]
pub enum NextPage {
    /// Send this request next
    Continue(Transformable),
    /// No more pages
    Done,
}

impl NextPage {
    /// Check if this is a done result
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if this is a continue result
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }
}

/// `response.pagination` as written in a source config: either a transform
/// list or a `header` block
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PaginationConfig {
    /// Body-driven pagination transforms
    Transforms(Vec<TransformSpec>),
    /// Next URL taken from a response header
    Header { header: HeaderPaginationConfig },
}

/// Header pagination settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderPaginationConfig {
    /// Response header holding the link
    pub field_name: String,
    /// Regular expression whose first capture group is the next URL
    pub regex_pattern: String,
}

/// Core trait for pagination strategies
pub trait Paginator: Send + Sync {
    /// Derive the request following `last_request`.
    ///
    /// `ctx` already holds the response to `last_request` as its last response.
    fn next_page(&self, ctx: &TransformContext, last_request: &Transformable) -> Result<NextPage>;
}

/// The paginator selected by a source config
#[derive(Debug, Clone, Default)]
pub enum Pagination {
    /// Single page
    #[default]
    None,
    Header(HeaderPaginator),
    Body(BodyPaginator),
}

impl Pagination {
    /// Compile a pagination block
    pub fn new(config: Option<&PaginationConfig>, registry: &TransformRegistry) -> Result<Self> {
        match config {
            None => Ok(Self::None),
            Some(PaginationConfig::Transforms(specs)) if specs.is_empty() => Ok(Self::None),
            Some(PaginationConfig::Transforms(specs)) => {
                Ok(Self::Body(BodyPaginator::new(specs, registry)?))
            }
            Some(PaginationConfig::Header { header }) => {
                Ok(Self::Header(HeaderPaginator::new(header)?))
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl Paginator for Pagination {
    fn next_page(&self, ctx: &TransformContext, last_request: &Transformable) -> Result<NextPage> {
        match self {
            Self::None => NoPaginator.next_page(ctx, last_request),
            Self::Header(p) => p.next_page(ctx, last_request),
            Self::Body(p) => p.next_page(ctx, last_request),
        }
    }
}
