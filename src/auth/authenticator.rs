//! Authenticator implementation
//!
//! Handles applying authentication to requests and managing token refresh.

use super::types::{AuthStrategy, CachedToken, GoogleSource, OAuth2Flow};
use crate::error::{Error, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const JWT_LIFETIME_SECONDS: i64 = 3600;

/// Authenticator handles applying authentication to HTTP requests
pub struct Authenticator {
    /// Validated strategy
    strategy: AuthStrategy,
    /// Cached token for OAuth2 flows
    cached_token: Arc<RwLock<Option<CachedToken>>>,
    /// HTTP client for token requests
    http_client: Client,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.strategy {
            AuthStrategy::None => "none",
            AuthStrategy::Basic { .. } => "basic",
            AuthStrategy::OAuth2(_) => "oauth2",
        };
        f.debug_struct("Authenticator")
            .field("strategy", &kind)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Create a new authenticator for the given strategy
    pub fn new(strategy: AuthStrategy) -> Self {
        Self::with_client(strategy, Client::new())
    }

    /// Create an authenticator with a custom HTTP client
    pub fn with_client(strategy: AuthStrategy, http_client: Client) -> Self {
        Self {
            strategy,
            cached_token: Arc::new(RwLock::new(None)),
            http_client,
        }
    }

    /// Apply authentication to a request builder
    pub async fn apply(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        match &self.strategy {
            AuthStrategy::None => Ok(req),
            AuthStrategy::Basic { user, password } => Ok(req.basic_auth(user, Some(password))),
            AuthStrategy::OAuth2(_) => {
                let token = self.get_or_refresh_token().await?;
                Ok(req.bearer_auth(token))
            }
        }
    }

    /// Get a valid token, refreshing if necessary
    async fn get_or_refresh_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.cached_token.write().await;

        // Another task may have refreshed while we waited
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        let new_token = self.fetch_new_token().await?;
        let token_str = new_token.token.clone();
        *cached = Some(new_token);

        Ok(token_str)
    }

    async fn fetch_new_token(&self) -> Result<CachedToken> {
        let AuthStrategy::OAuth2(flow) = &self.strategy else {
            return Err(Error::auth("Token refresh not supported for this auth type"));
        };
        debug!("requesting new oauth2 token");

        match flow {
            OAuth2Flow::ClientCredentials {
                token_url,
                client_id,
                client_secret,
                scopes,
                endpoint_params,
            } => {
                let mut form = vec![
                    ("grant_type".to_string(), "client_credentials".to_string()),
                    ("client_id".to_string(), client_id.clone()),
                    ("client_secret".to_string(), client_secret.clone()),
                ];
                push_scopes_and_params(&mut form, scopes, endpoint_params);
                self.request_token(token_url, &form).await
            }
            OAuth2Flow::Password {
                token_url,
                client_id,
                client_secret,
                user,
                password,
                scopes,
                endpoint_params,
            } => {
                let mut form = vec![
                    ("grant_type".to_string(), "password".to_string()),
                    ("username".to_string(), user.clone()),
                    ("password".to_string(), password.clone()),
                    ("client_id".to_string(), client_id.clone()),
                    ("client_secret".to_string(), client_secret.clone()),
                ];
                push_scopes_and_params(&mut form, scopes, endpoint_params);
                self.request_token(token_url, &form).await
            }
            OAuth2Flow::Google { source, scopes } => self.fetch_google(source, scopes).await,
        }
    }

    async fn fetch_google(&self, source: &GoogleSource, scopes: &[String]) -> Result<CachedToken> {
        let (json, subject) = match source {
            GoogleSource::Credentials(json) => (json, None),
            GoogleSource::Jwt { json, subject } => (json, subject.as_deref()),
        };
        let creds: GoogleCredentials = serde_json::from_str(json)?;

        match creds.kind.as_str() {
            "service_account" => {
                let jwt = creds.sign_assertion(scopes, subject)?;
                let form = vec![
                    ("grant_type".to_string(), JWT_BEARER_GRANT.to_string()),
                    ("assertion".to_string(), jwt),
                ];
                self.request_token(creds.token_url(), &form).await
            }
            "authorized_user" if matches!(source, GoogleSource::Credentials(_)) => {
                let form = vec![
                    ("grant_type".to_string(), "refresh_token".to_string()),
                    ("client_id".to_string(), creds.client_id.clone()),
                    ("client_secret".to_string(), creds.client_secret.clone()),
                    ("refresh_token".to_string(), creds.refresh_token.clone()),
                ];
                self.request_token(creds.token_url(), &form).await
            }
            other => Err(Error::auth(format!(
                "unsupported google credentials type \"{other}\""
            ))),
        }
    }

    /// POST a token form and cache the answer
    async fn request_token(&self, token_url: &str, form: &[(String, String)]) -> Result<CachedToken> {
        let response = self
            .http_client
            .post(token_url)
            .form(form)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::OAuth2 {
                message: format!("Token request failed with status {status}: {body}"),
            });
        }

        let token_response: TokenResponse = response.json().await.map_err(Error::Http)?;
        Ok(token_response.into_cached_token())
    }

    /// Clear the cached token
    pub async fn clear_cache(&self) {
        let mut cached = self.cached_token.write().await;
        *cached = None;
    }

    /// Get the validated strategy
    pub fn strategy(&self) -> &AuthStrategy {
        &self.strategy
    }
}

fn push_scopes_and_params(
    form: &mut Vec<(String, String)>,
    scopes: &[String],
    endpoint_params: &BTreeMap<String, String>,
) {
    if !scopes.is_empty() {
        form.push(("scope".to_string(), scopes.join(" ")));
    }
    for (key, value) in endpoint_params {
        form.push((key.clone(), value.clone()));
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
}

/// Some providers (Azure among them) send `expires_in` as a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(i64),
    Text(String),
}

impl TokenResponse {
    fn into_cached_token(self) -> CachedToken {
        let secs = match self.expires_in {
            Some(ExpiresIn::Seconds(s)) => Some(s),
            Some(ExpiresIn::Text(s)) => s.trim().parse::<i64>().ok(),
            None => None,
        };
        match secs.filter(|s| *s > 0) {
            Some(secs) => CachedToken::expires_in(self.access_token, secs),
            None => CachedToken::new(self.access_token, None),
        }
    }
}

/// Google credentials JSON, service account or authorized user
#[derive(Debug, Deserialize)]
struct GoogleCredentials {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    client_email: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    private_key_id: String,
    #[serde(default)]
    token_uri: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    refresh_token: String,
}

/// JWT claims for the service account assertion
#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
    #[serde(skip_serializing_if = "String::is_empty")]
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl GoogleCredentials {
    fn token_url(&self) -> &str {
        if self.token_uri.is_empty() {
            GOOGLE_TOKEN_URL
        } else {
            &self.token_uri
        }
    }

    fn sign_assertion(&self, scopes: &[String], subject: Option<&str>) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: &self.client_email,
            sub: subject,
            scope: scopes.join(" "),
            aud: self.token_url(),
            iat: now,
            exp: now + JWT_LIFETIME_SECONDS,
        };

        let mut header = Header::new(Algorithm::RS256);
        if !self.private_key_id.is_empty() {
            header.kid = Some(self.private_key_id.clone());
        }

        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            Error::JwtGeneration {
                message: format!("Invalid private key: {e}"),
            }
        })?;

        encode(&header, &claims, &encoding_key).map_err(|e| Error::JwtGeneration {
            message: format!("Failed to encode JWT: {e}"),
        })
    }
}
