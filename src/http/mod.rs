//! HTTP client module
//!
//! Sends requests with retries, header driven rate limiting and
//! authentication.
//!
//! # Overview
//!
//! - **Retry Policy**: transport errors and 5xx (except 501) are retried
//!   with exponential backoff clamped to `[wait_min, wait_max]`; an optional
//!   `until` template can keep retrying a response until its body matches
//! - **Rate Limiting**: a 429 response is inspected with the `remaining` and
//!   `reset` templates; when quota is exhausted the client sleeps until reset
//! - **Cancellation**: the request, the backoff sleep and the rate limit
//!   sleep all stop as soon as the worker's token is cancelled

mod client;
mod rate_limit;
mod retry;

pub use client::{
    HttpClient, HttpClientConfig, HttpClientConfigBuilder, HttpRequest, HttpResponse,
    DEFAULT_TIMEOUT,
};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{RetryConfig, RetryPolicy};
