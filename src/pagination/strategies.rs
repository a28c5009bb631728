//! Pagination strategy implementations
//!
//! Each strategy handles a specific pagination pattern.

use super::types::{HeaderPaginationConfig, NextPage, Paginator};
use crate::context::TransformContext;
use crate::error::{Error, Result};
use crate::transform::{Namespace, Target, Transform, TransformRegistry, TransformSpec, Transformable};
use regex::Regex;
use tracing::debug;
use url::Url;

// ============================================================================
// Header Pagination
// ============================================================================

/// Next URL extracted from a response header
///
/// Common patterns:
/// - `Link: <https://api.example.com/items?page=2>; rel="next"`
/// - `X-Next-Page: https://api.example.com/items?page=2`
#[derive(Debug, Clone)]
pub struct HeaderPaginator {
    /// Header holding the next link
    pub field_name: String,
    /// First capture group is the next URL
    pub pattern: Regex,
}

impl HeaderPaginator {
    /// Create a new header paginator, compiling its pattern
    pub fn new(config: &HeaderPaginationConfig) -> Result<Self> {
        if config.field_name.is_empty() {
            return Err(Error::missing_field("response.pagination.header.field_name"));
        }
        let pattern = Regex::new(&config.regex_pattern).map_err(|e| {
            Error::invalid_value("response.pagination.header.regex_pattern", e.to_string())
        })?;
        if pattern.captures_len() < 2 {
            return Err(Error::invalid_value(
                "response.pagination.header.regex_pattern",
                "the pattern needs a capture group for the next url",
            ));
        }
        Ok(Self {
            field_name: config.field_name.clone(),
            pattern,
        })
    }
}

impl Paginator for HeaderPaginator {
    fn next_page(&self, ctx: &TransformContext, last_request: &Transformable) -> Result<NextPage> {
        let response = ctx.last_response();
        let found = response
            .header
            .get_all(self.field_name.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| {
                self.pattern
                    .captures(v)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            });
        let Some(next) = found.filter(|s| !s.is_empty()) else {
            return Ok(NextPage::Done);
        };

        let fetched = response.url.as_ref().or(last_request.url.as_ref());
        if fetched.is_some_and(|u| u.as_str() == next) {
            debug!(url = %next, "next page link equals the current url, stopping");
            return Ok(NextPage::Done);
        }

        let url = match fetched {
            Some(base) => base.join(&next),
            None => Url::parse(&next),
        }
        .map_err(|e| Error::transform(format!("invalid next page url {next:?}: {e}")))?;

        let mut request = last_request.clone();
        request.url = Some(url);
        Ok(NextPage::Continue(request))
    }
}

// ============================================================================
// Body Pagination
// ============================================================================

/// Pagination transforms run over a copy of the last request
#[derive(Debug, Clone)]
pub struct BodyPaginator {
    /// Compiled pagination transforms
    pub transforms: Vec<Transform>,
}

impl BodyPaginator {
    /// Compile a pagination transform list
    pub fn new(specs: &[TransformSpec], registry: &TransformRegistry) -> Result<Self> {
        Ok(Self {
            transforms: registry.build(Namespace::Pagination, specs)?,
        })
    }
}

impl Paginator for BodyPaginator {
    fn next_page(&self, ctx: &TransformContext, last_request: &Transformable) -> Result<NextPage> {
        let mut next = last_request.clone();
        let mut applied = 0;
        for t in &self.transforms {
            if t.run(ctx, &mut next)? {
                applied += 1;
            } else if t.target == Target::UrlValue {
                debug!("no value for the next page url, stopping");
                return Ok(NextPage::Done);
            }
        }

        if applied == 0 {
            return Ok(NextPage::Done);
        }
        let same_url = next.url.as_ref().map(Url::as_str) == last_request.url.as_ref().map(Url::as_str);
        if same_url && next.body == last_request.body {
            debug!("next page request equals the last one, stopping");
            return Ok(NextPage::Done);
        }
        Ok(NextPage::Continue(next))
    }
}

// ============================================================================
// No Pagination
// ============================================================================

/// No pagination - single request
#[derive(Debug, Clone, Default)]
pub struct NoPaginator;

impl Paginator for NoPaginator {
    fn next_page(&self, _ctx: &TransformContext, _last_request: &Transformable) -> Result<NextPage> {
        Ok(NextPage::Done)
    }
}
