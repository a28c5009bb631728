//! Auth configuration types
//!
//! `AuthConfig` is what a source config declares; `AuthStrategy` is the
//! validated form the authenticator runs with.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// `auth` block of a source config
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub basic: Option<BasicAuthConfig>,
    #[serde(default)]
    pub oauth2: Option<OAuth2Config>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasicAuthConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl BasicAuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// OAuth2 token providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OAuth2Provider {
    #[default]
    Default,
    Azure,
    Google,
}

impl<'de> Deserialize<'de> for OAuth2Provider {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        match raw.to_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "azure" => Ok(Self::Azure),
            "google" => Ok(Self::Google),
            _ => Err(serde::de::Error::custom(format!("unknown provider \"{raw}\""))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuth2ClientConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureConfig {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub resource: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleConfig {
    #[serde(default)]
    pub credentials_file: String,
    #[serde(default)]
    pub credentials_json: String,
    #[serde(default)]
    pub jwt_file: String,
    #[serde(default)]
    pub jwt_json: String,
    #[serde(default)]
    pub delegated_account: String,
}

/// `auth.oauth2` block
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuth2Config {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub provider: OAuth2Provider,
    #[serde(default)]
    pub client: OAuth2ClientConfig,
    #[serde(default)]
    pub token_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub endpoint_params: BTreeMap<String, String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub google: GoogleConfig,
}

impl OAuth2Config {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

// ============================================================================
// Validated strategies
// ============================================================================

/// Where Google credentials come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoogleSource {
    /// Service account or authorized user JSON
    Credentials(String),
    /// Service account JSON used as a JWT signer, optionally impersonating a user
    Jwt {
        json: String,
        subject: Option<String>,
    },
}

/// Token request flows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuth2Flow {
    ClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: String,
        scopes: Vec<String>,
        endpoint_params: BTreeMap<String, String>,
    },
    /// Resource owner password grant
    Password {
        token_url: String,
        client_id: String,
        client_secret: String,
        user: String,
        password: String,
        scopes: Vec<String>,
        endpoint_params: BTreeMap<String, String>,
    },
    Google {
        source: GoogleSource,
        scopes: Vec<String>,
    },
}

/// Validated authentication for a request factory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthStrategy {
    #[default]
    None,
    Basic {
        user: String,
        password: String,
    },
    OAuth2(OAuth2Flow),
}

const AZURE_TOKEN_URL: &str = "https://login.microsoftonline.com";

impl AuthConfig {
    /// Validate the block and pick the strategy
    pub fn strategy(&self) -> Result<AuthStrategy> {
        let basic = self.basic.as_ref().filter(|b| b.is_enabled());
        let oauth2 = self.oauth2.as_ref().filter(|o| o.is_enabled());
        match (basic, oauth2) {
            (Some(_), Some(_)) => Err(auth_err("only one kind of auth can be enabled")),
            (Some(b), None) => {
                if b.user.is_empty() || b.password.is_empty() {
                    return Err(auth_err("both user and password must be set"));
                }
                Ok(AuthStrategy::Basic {
                    user: b.user.clone(),
                    password: b.password.clone(),
                })
            }
            (None, Some(o)) => Ok(AuthStrategy::OAuth2(o.flow()?)),
            (None, None) => Ok(AuthStrategy::None),
        }
    }
}

impl OAuth2Config {
    fn flow(&self) -> Result<OAuth2Flow> {
        match self.provider {
            OAuth2Provider::Default => self.default_flow(),
            OAuth2Provider::Azure => self.azure_flow(),
            OAuth2Provider::Google => self.google_flow(),
        }
    }

    fn default_flow(&self) -> Result<OAuth2Flow> {
        if self.token_url.is_empty() || self.client.id.is_empty() || self.client.secret.is_empty() {
            return Err(auth_err("both token_url and client credentials must be provided"));
        }
        self.password_or_client_flow(self.token_url.clone(), self.endpoint_params.clone())
    }

    fn password_or_client_flow(
        &self,
        token_url: String,
        endpoint_params: BTreeMap<String, String>,
    ) -> Result<OAuth2Flow> {
        match (self.user.is_empty(), self.password.is_empty()) {
            (true, true) => Ok(OAuth2Flow::ClientCredentials {
                token_url,
                client_id: self.client.id.clone(),
                client_secret: self.client.secret.clone(),
                scopes: self.scopes.clone(),
                endpoint_params,
            }),
            (false, false) => Ok(OAuth2Flow::Password {
                token_url,
                client_id: self.client.id.clone(),
                client_secret: self.client.secret.clone(),
                user: self.user.clone(),
                password: self.password.clone(),
                scopes: self.scopes.clone(),
                endpoint_params,
            }),
            _ => Err(auth_err("both user and password credentials must be provided")),
        }
    }

    fn azure_flow(&self) -> Result<OAuth2Flow> {
        let tenant = &self.azure.tenant_id;
        if self.token_url.is_empty() && tenant.is_empty() {
            return Err(auth_err("at least one of token_url or tenant_id must be provided"));
        }
        if !self.token_url.is_empty() && !tenant.is_empty() {
            return Err(auth_err("only one of token_url and tenant_id can be used"));
        }
        if self.client.id.is_empty() || self.client.secret.is_empty() {
            return Err(auth_err("client credentials must be provided"));
        }
        let token_url = if tenant.is_empty() {
            self.token_url.clone()
        } else {
            format!("{AZURE_TOKEN_URL}/{tenant}/oauth2/v2.0/token")
        };
        let mut params = self.endpoint_params.clone();
        if !self.azure.resource.is_empty() {
            params.insert("resource".to_string(), self.azure.resource.clone());
        }
        self.password_or_client_flow(token_url, params)
    }

    fn google_flow(&self) -> Result<OAuth2Flow> {
        if !self.token_url.is_empty()
            || !self.client.id.is_empty()
            || !self.client.secret.is_empty()
            || !self.endpoint_params.is_empty()
            || !self.user.is_empty()
            || !self.password.is_empty()
        {
            return Err(auth_err(
                "none of token_url and client credentials can be used, use google.credentials_file, google.jwt_file, google.credentials_json or ADC instead",
            ));
        }

        let g = &self.google;
        let delegated = (!g.delegated_account.is_empty()).then(|| g.delegated_account.clone());
        let reject_delegation = || -> Result<()> {
            if delegated.is_some() {
                return Err(auth_err(
                    "google.delegated_account can only be provided with a jwt_file",
                ));
            }
            Ok(())
        };

        let source = if !g.credentials_file.is_empty() {
            reject_delegation()?;
            GoogleSource::Credentials(read_json_file(&g.credentials_file)?)
        } else if !g.jwt_file.is_empty() {
            GoogleSource::Jwt {
                json: read_json_file(&g.jwt_file)?,
                subject: delegated.clone(),
            }
        } else if !g.credentials_json.is_empty() {
            reject_delegation()?;
            check_json("google.credentials_json", &g.credentials_json)?;
            GoogleSource::Credentials(g.credentials_json.clone())
        } else if !g.jwt_json.is_empty() {
            check_json("google.jwt_json", &g.jwt_json)?;
            GoogleSource::Jwt {
                json: g.jwt_json.clone(),
                subject: delegated.clone(),
            }
        } else {
            reject_delegation()?;
            GoogleSource::Credentials(find_default_credentials().ok_or_else(|| {
                auth_err("no authentication credentials were configured or detected (ADC)")
            })?)
        };

        Ok(OAuth2Flow::Google {
            source,
            scopes: self.scopes.clone(),
        })
    }
}

fn auth_err(message: &str) -> Error {
    Error::invalid_value("auth", message)
}

fn check_json(field: &str, raw: &str) -> Result<()> {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(|_| ())
        .map_err(|_| auth_err(&format!("{field} must be valid JSON")))
}

fn read_json_file(path: &str) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|_| auth_err(&format!("the file \"{path}\" cannot be found")))?;
    if serde_json::from_str::<serde_json::Value>(&raw).is_err() {
        return Err(auth_err(&format!(
            "the file \"{path}\" does not contain valid JSON"
        )));
    }
    Ok(raw)
}

/// Application default credentials: `GOOGLE_APPLICATION_CREDENTIALS`, then
/// the gcloud well-known file
fn find_default_credentials() -> Option<String> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(p) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
        if !p.is_empty() {
            candidates.push(PathBuf::from(p));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        candidates.push(
            Path::new(&home).join(".config/gcloud/application_default_credentials.json"),
        );
    }
    candidates
        .into_iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .find(|raw| serde_json::from_str::<serde_json::Value>(raw).is_ok())
}

// ============================================================================
// Token cache
// ============================================================================

/// Cached token with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The access token
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        let expires_at = Utc::now() + chrono::Duration::seconds(seconds);
        Self {
            token,
            expires_at: Some(expires_at),
        }
    }

    /// Check if the token is expired (with 30 second buffer)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = chrono::Duration::seconds(30);
                Utc::now() + buffer >= expires_at
            }
            None => false, // No expiration = never expires
        }
    }
}
