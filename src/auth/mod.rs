//! Authentication module
//!
//! Supports: Basic, OAuth2 (default, Azure, Google)
//!
//! `AuthConfig` is validated into an `AuthStrategy` when a source loads. The
//! `Authenticator` applies it to outgoing requests and caches OAuth2 tokens
//! until 30 seconds before they expire.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{
    AuthConfig, AuthStrategy, AzureConfig, BasicAuthConfig, CachedToken, GoogleConfig,
    GoogleSource, OAuth2ClientConfig, OAuth2Config, OAuth2Flow, OAuth2Provider,
};
