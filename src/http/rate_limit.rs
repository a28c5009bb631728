//! Header driven rate limiting
//!
//! When a server answers 429 the configured `remaining` and `reset`
//! templates are evaluated against the response headers to find out how long
//! to wait before sending again.

use super::client::HttpResponse;
use crate::context::{ResponseSnapshot, TransformContext};
use crate::error::{Error, Result};
use crate::template::ValueTemplate;
use crate::transform::Transformable;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// `request.rate_limit` block
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub limit: Option<ValueTemplate>,
    #[serde(default)]
    pub remaining: Option<ValueTemplate>,
    #[serde(default)]
    pub reset: Option<ValueTemplate>,
}

/// Evaluates rate-limit headers of throttled responses
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    limit: Option<ValueTemplate>,
    remaining: Option<ValueTemplate>,
    reset: Option<ValueTemplate>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.limit.clone(),
            remaining: config.remaining.clone(),
            reset: config.reset.clone(),
        }
    }

    /// Whether 429 responses are handled instead of failing the attempt
    pub fn is_enabled(&self) -> bool {
        self.remaining.is_some()
    }

    /// How long to wait after a 429 response; `None` means send again now
    pub fn wait_for(&self, resp: &HttpResponse) -> Result<Option<Duration>> {
        self.wait_for_at(resp, Utc::now())
    }

    /// Same as [`wait_for`](Self::wait_for) with a fixed clock
    pub fn wait_for_at(&self, resp: &HttpResponse, now: DateTime<Utc>) -> Result<Option<Duration>> {
        let Some(remaining_tpl) = &self.remaining else {
            return Ok(None);
        };

        let mut ctx = TransformContext::default();
        ctx.update_last_response(ResponseSnapshot {
            status: resp.status,
            header: resp.header.clone(),
            url: Some(resp.url.clone()),
            ..Default::default()
        });
        let tr = Transformable::default();
        let render = |tpl: &ValueTemplate| tpl.execute(&ctx, &tr, None).unwrap_or_default();

        if let Some(limit) = &self.limit {
            debug!(limit = %render(limit), "rate limit reached");
        }

        let remaining = render(remaining_tpl);
        if remaining.is_empty() {
            return Err(Error::rate_limit("remaining value is empty"));
        }
        let remaining: i64 = remaining.trim().parse().map_err(|e| {
            Error::rate_limit(format!("failed to parse rate-limit remaining value: {e}"))
        })?;
        if remaining != 0 {
            return Ok(None);
        }

        let Some(reset_tpl) = &self.reset else {
            warn!("reset rate limit is not set");
            return Ok(None);
        };
        let reset = render(reset_tpl);
        if reset.is_empty() {
            return Err(Error::rate_limit("reset value is empty"));
        }
        let epoch: i64 = reset.trim().parse().map_err(|e| {
            Error::rate_limit(format!("failed to parse rate-limit reset value: {e}"))
        })?;

        let wait = epoch - now.timestamp();
        if epoch == 0 || wait <= 0 {
            debug!("no need to apply rate limit");
            return Ok(None);
        }
        debug!(reset = epoch, "waiting for the rate limit to reset");
        Ok(Some(Duration::from_secs(wait as u64)))
    }
}
