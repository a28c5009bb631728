//! HTTP client with retry and rate limiting
//!
//! Every attempt goes through the retry policy; responses that come back 429
//! are handed to the rate limiter, which may pause before the whole retried
//! exchange is sent again. All waits observe the worker's cancellation token.

use super::rate_limit::RateLimiter;
use super::retry::RetryPolicy;
use crate::auth::{AuthStrategy, Authenticator};
use crate::error::{Error, Result};
use crate::tracer::Tracer;
use crate::types::JsonValue;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Retry policy
    pub retry: RetryPolicy,
    /// Rate limiter for 429 responses
    pub rate_limiter: RateLimiter,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            rate_limiter: RateLimiter::default(),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the rate limiter
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.config.rate_limiter = limiter;
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// A fully built request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub header: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// A response with its body read to the end
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub header: HeaderMap,
    /// Final URL after redirects
    pub url: Url,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as JSON
    pub fn json(&self) -> Result<JsonValue> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as lossy UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Seconds from a `Retry-After` header
    pub fn retry_after(&self) -> Option<Duration> {
        self.header
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// HTTP client with retry and rate limiting
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    authenticator: Option<Arc<Authenticator>>,
    tracer: Option<Arc<Tracer>>,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            authenticator: None,
            tracer: None,
        })
    }

    /// Attach authentication; `AuthStrategy::None` leaves requests untouched
    #[must_use]
    pub fn with_auth(mut self, strategy: AuthStrategy) -> Self {
        self.authenticator = match strategy {
            AuthStrategy::None => None,
            other => Some(Arc::new(Authenticator::with_client(
                other,
                self.client.clone(),
            ))),
        };
        self
    }

    /// Share an authenticator (and its token cache) with another client
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Option<Arc<Authenticator>>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Record every exchange to a tracer
    #[must_use]
    pub fn with_tracer(mut self, tracer: Option<Arc<Tracer>>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn authenticator(&self) -> Option<&Arc<Authenticator>> {
        self.authenticator.as_ref()
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Send a request through the rate limiter and retry policy.
    ///
    /// Returns the first 2xx response. Any other final status is
    /// `Error::HttpStatus`; cancellation is `Error::Cancelled`.
    pub async fn execute(&self, req: &HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse> {
        let limiter = &self.config.rate_limiter;
        let max_attempts = self.config.retry.max_attempts();
        let mut unthrottled = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let resp = self.send_with_retry(req, cancel).await?;
            if resp.is_success() {
                return Ok(resp);
            }
            if resp.status != 429 || !limiter.is_enabled() {
                return Err(Error::http_status(resp.status, resp.text()));
            }

            let wait = match limiter.wait_for(&resp)? {
                Some(wait) => wait,
                None => {
                    unthrottled += 1;
                    if unthrottled >= max_attempts {
                        return Err(Error::http_status(resp.status, resp.text()));
                    }
                    resp.retry_after().unwrap_or(Duration::ZERO)
                }
            };
            debug!(url = %req.url, "rate limited, waiting {:?}", wait);
            sleep_or_cancel(wait, cancel).await;
        }
    }

    /// Send with retries; the last response is returned once attempts run out
    async fn send_with_retry(&self, req: &HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse> {
        let policy = &self.config.retry;
        let max_attempts = policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = self.send_once(req, cancel).await;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if !policy.should_retry(&outcome) {
                return outcome;
            }

            if attempt >= max_attempts {
                return match outcome {
                    Ok(resp) => {
                        warn!(
                            url = %req.url,
                            "giving up after {} attempt(s), last status {}",
                            attempt,
                            resp.status
                        );
                        Ok(resp)
                    }
                    Err(e) => Err(Error::MaxRetriesExceeded {
                        attempts: attempt,
                        last: e.to_string(),
                    }),
                };
            }

            let delay = policy.backoff(attempt - 1, outcome.as_ref().ok());
            let reason = match &outcome {
                Ok(resp) => resp.status.to_string(),
                Err(e) => e.to_string(),
            };
            warn!(
                "Request failed with {}, attempt {}/{}, retrying in {:?}",
                reason, attempt, max_attempts, delay
            );
            if sleep_or_cancel(delay, cancel).await {
                return Err(Error::Cancelled);
            }
        }
    }

    async fn send_once(&self, req: &HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(req.method.clone(), req.url.clone())
            .headers(req.header.clone());
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }
        if let Some(auth) = &self.authenticator {
            builder = auth.apply(builder).await?;
        }

        let timeout = self.config.timeout;
        let exchange = async {
            let response = builder.send().await.map_err(|e| classify(e, timeout))?;
            let status = response.status().as_u16();
            let header = response.headers().clone();
            let url = response.url().clone();
            let body = response.bytes().await.map_err(|e| classify(e, timeout))?;
            Ok(HttpResponse {
                status,
                header,
                url,
                body: body.to_vec(),
            })
        };

        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            outcome = exchange => outcome,
        };

        debug!(method = %req.method, url = %req.url, ok = outcome.is_ok(), "request sent");
        if let Some(tracer) = &self.tracer {
            tracer.record(req, &outcome).await;
        }
        outcome
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_authenticator", &self.authenticator.is_some())
            .field("has_tracer", &self.tracer.is_some())
            .finish_non_exhaustive()
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        Error::Http(err)
    }
}

/// Sleep for `wait` unless cancelled first; returns whether it was cancelled
async fn sleep_or_cancel(wait: Duration, cancel: &CancellationToken) -> bool {
    if wait.is_zero() {
        return cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(wait) => false,
    }
}
