//! Engine types
//!
//! Compiled source configuration and per-interval statistics.

use super::chain::{validate_replace, ReplaceWith};
use super::request::RequestFactory;
use super::response::ResponseProcessor;
use crate::auth::AuthStrategy;
use crate::context::Cursor;
use crate::error::{Error, Result};
use crate::http::{HttpClientConfig, RateLimiter, RetryPolicy, DEFAULT_TIMEOUT};
use crate::loader::{ChainDefinition, RequestDefinition, ResponseDefinition, SourceDefinition};
use crate::template::ValueTemplate;
use crate::tracer::TracerConfig;
use crate::transform::TransformRegistry;
use std::time::Duration;

/// A source definition compiled and validated, ready to run
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Checkpoint key
    pub id: String,
    pub interval: Duration,
    pub auth: AuthStrategy,
    pub root: StepConfig,
    pub chain: Vec<ChainStep>,
    pub cursor: Cursor,
    pub tracer: Option<TracerConfig>,
}

impl SourceConfig {
    /// Validate a definition and compile every template and transform in it
    pub fn compile(def: &SourceDefinition, registry: &TransformRegistry) -> Result<Self> {
        if def.interval.is_zero() {
            return Err(Error::invalid_value(
                "interval",
                "interval must be greater than 0",
            ));
        }

        let auth = match &def.auth {
            Some(auth) => auth.strategy()?,
            None => AuthStrategy::None,
        };

        let root = StepConfig::compile(&def.request, &def.response, None, registry)?;
        let chain = def
            .chain
            .iter()
            .enumerate()
            .map(|(i, link)| {
                ChainStep::compile(link, registry)
                    .map_err(|e| Error::config(format!("chain[{i}]: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let tracer = def.request.tracer.clone().filter(|t| t.enabled);

        Ok(Self {
            id: def.id.clone().unwrap_or_else(|| def.request.url.clone()),
            interval: def.interval,
            auth,
            root,
            chain,
            cursor: Cursor::new(def.cursor.clone()),
            tracer,
        })
    }
}

/// One request/response pair: the root request or a chain step
#[derive(Debug, Clone)]
pub struct StepConfig {
    pub request: RequestFactory,
    pub response: ResponseProcessor,
    pub client: HttpClientConfig,
}

impl StepConfig {
    pub fn compile(
        request: &RequestDefinition,
        response: &ResponseDefinition,
        until: Option<ValueTemplate>,
        registry: &TransformRegistry,
    ) -> Result<Self> {
        request.retry.validate()?;

        let mut retry = RetryPolicy::new(&request.retry);
        if let Some(until) = until {
            retry = retry.with_until(until);
        }
        let limiter = request
            .rate_limit
            .as_ref()
            .map(RateLimiter::new)
            .unwrap_or_default();
        let client = HttpClientConfig::builder()
            .timeout(request.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .retry(retry)
            .rate_limiter(limiter)
            .build();

        Ok(Self {
            request: RequestFactory::new(request, registry)?,
            response: ResponseProcessor::new(response, registry)?,
            client,
        })
    }
}

/// How a chain step issues its requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    /// One request per id
    Step,
    /// One request per id, repeated until `until` holds
    While,
}

/// A compiled chain entry
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub kind: ChainKind,
    pub step: StepConfig,
    /// Own auth; `None` inherits the source auth
    pub auth: Option<AuthStrategy>,
    /// JSONPath selecting ids, also the text replaced in the URL
    pub replace: String,
    pub replace_with: Option<ReplaceWith>,
}

impl ChainStep {
    pub fn compile(def: &ChainDefinition, registry: &TransformRegistry) -> Result<Self> {
        let (kind, body) = match (&def.step, &def.while_) {
            (Some(step), None) => (ChainKind::Step, step),
            (None, Some(step)) => (ChainKind::While, step),
            _ => {
                return Err(Error::config(
                    "exactly one of step or while must be set in a chain entry",
                ))
            }
        };

        match (kind, &body.until) {
            (ChainKind::While, None) => {
                return Err(Error::missing_field("chain.while.until"));
            }
            (ChainKind::Step, Some(_)) => {
                return Err(Error::invalid_value(
                    "chain.step.until",
                    "until can only be used with while",
                ));
            }
            _ => {}
        }

        if body.replace.is_empty() {
            return Err(Error::missing_field("chain.replace"));
        }
        validate_replace(&body.replace)?;

        if body.request.tracer.is_some() {
            return Err(Error::invalid_value(
                "chain.request.tracer",
                "tracer can only be set on the root request",
            ));
        }

        let replace_with = body
            .replace_with
            .as_deref()
            .map(ReplaceWith::parse)
            .transpose()?;
        let auth = body.auth.as_ref().map(|a| a.strategy()).transpose()?;
        let step = StepConfig::compile(
            &body.request,
            &ResponseDefinition::from(&body.response),
            body.until.clone(),
            registry,
        )?;

        Ok(Self {
            kind,
            step,
            auth,
            replace: body.replace.clone(),
            replace_with,
        })
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// What one interval did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalStats {
    pub events_published: u64,
    pub pages: u64,
    pub duration: Duration,
}

impl IntervalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&mut self) {
        self.events_published += 1;
    }

    pub fn add_page(&mut self) {
        self.pages += 1;
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }
}
