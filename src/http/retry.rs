//! Retry policy
//!
//! Decides whether an attempt is repeated and how long to wait before the
//! next one.

use super::client::HttpResponse;
use crate::context::{ResponseSnapshot, TransformContext};
use crate::error::{is_retryable_status, Error, Result};
use crate::template::ValueTemplate;
use crate::transform::Transformable;
use crate::types::deserialize_duration;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_WAIT_MIN: Duration = Duration::from_secs(1);
const DEFAULT_WAIT_MAX: Duration = Duration::from_secs(60);

/// `request.retry` block
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_wait_min", deserialize_with = "deserialize_duration")]
    pub wait_min: Duration,
    #[serde(default = "default_wait_max", deserialize_with = "deserialize_duration")]
    pub wait_max: Duration,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_wait_min() -> Duration {
    DEFAULT_WAIT_MIN
}

fn default_wait_max() -> Duration {
    DEFAULT_WAIT_MAX
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_min: DEFAULT_WAIT_MIN,
            wait_max: DEFAULT_WAIT_MAX,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_value(
                "retry.max_attempts",
                "max_attempts must be greater than 0",
            ));
        }
        if self.wait_min > self.wait_max {
            return Err(Error::invalid_value(
                "retry.wait_min",
                "wait_min must be less than or equal to wait_max",
            ));
        }
        Ok(())
    }
}

/// Compiled retry policy with an optional `until` condition
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    wait_min: Duration,
    wait_max: Duration,
    until: Option<ValueTemplate>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            wait_min: config.wait_min,
            wait_max: config.wait_max,
            until: None,
        }
    }

    /// Repeat a response until `until` renders `true` against its body
    #[must_use]
    pub fn with_until(mut self, until: ValueTemplate) -> Self {
        self.until = Some(until);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide whether the outcome of an attempt should be retried
    pub fn should_retry(&self, outcome: &Result<HttpResponse>) -> bool {
        match outcome {
            Err(Error::Cancelled) => false,
            Err(e) => e.is_retryable(),
            Ok(resp) if is_retryable_status(resp.status) => true,
            Ok(resp) => match &self.until {
                Some(until) => !self.until_satisfied(until, resp),
                None => false,
            },
        }
    }

    /// `false` retries; `true` or an evaluation failure stops
    fn until_satisfied(&self, until: &ValueTemplate, resp: &HttpResponse) -> bool {
        let body = match resp.json() {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "retry condition: response body is not JSON");
                return true;
            }
        };
        let mut ctx = TransformContext::default();
        ctx.update_last_response(ResponseSnapshot::new(
            resp.status,
            resp.header.clone(),
            resp.url.clone(),
            body,
            0,
        ));
        match until.execute(&ctx, &Transformable::default(), None) {
            Ok(rendered) => parse_bool(&rendered).unwrap_or(true),
            Err(e) => {
                debug!(error = %e, "retry condition could not be evaluated");
                true
            }
        }
    }

    /// Exponential backoff from `wait_min`, clamped to `wait_max`.
    ///
    /// `Retry-After` on a 429 or 503 response takes precedence.
    pub fn backoff(&self, attempt: u32, resp: Option<&HttpResponse>) -> Duration {
        if let Some(after) = resp
            .filter(|r| r.status == 429 || r.status == 503)
            .and_then(HttpResponse::retry_after)
        {
            return after;
        }
        let factor = 2u32.saturating_pow(attempt);
        std::cmp::min(self.wait_min.saturating_mul(factor), self.wait_max)
    }
}

/// Boolean spellings accepted by the `until` condition
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
