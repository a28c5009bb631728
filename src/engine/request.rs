//! Request construction

use crate::context::TransformContext;
use crate::decode::EncodeAs;
use crate::error::{Error, Result};
use crate::http::HttpRequest;
use crate::loader::RequestDefinition;
use crate::template::user_agent;
use crate::transform::{run_all, Namespace, Transform, TransformRegistry, Transformable};
use crate::types::{JsonObject, JsonValue, Method};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use tracing::debug;
use url::Url;

/// Builds the requests of one step from its config
#[derive(Debug, Clone)]
pub struct RequestFactory {
    /// URL exactly as configured; chain ids are substituted into this text
    raw_url: String,
    url: Url,
    method: Method,
    body: Option<JsonObject>,
    headers: HeaderMap,
    transforms: Vec<Transform>,
    encode_as: Option<EncodeAs>,
}

impl RequestFactory {
    /// Compile a `request` block
    pub fn new(def: &RequestDefinition, registry: &TransformRegistry) -> Result<Self> {
        let url = Url::parse(&def.url)
            .map_err(|e| Error::invalid_value("request.url", format!("{:?}: {e}", def.url)))?;

        if def.body.is_some() && def.method != Method::POST {
            return Err(Error::invalid_value(
                "request.body",
                format!("body can't be used with method: {}", def.method),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let agent = HeaderValue::from_str(&user_agent(&[]))
            .map_err(|e| Error::config(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, agent);
        for (name, value) in &def.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::invalid_value("request.headers", format!("{name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                Error::invalid_value("request.headers", format!("{name}: {e}"))
            })?;
            headers.insert(name, value);
        }

        Ok(Self {
            raw_url: def.url.clone(),
            url,
            method: def.method,
            body: def.body.clone(),
            headers,
            transforms: registry.build(Namespace::Request, &def.transforms)?,
            encode_as: def.encode_as,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Build the in-flight request for `url` and run the request transforms
    pub fn transformable(&self, ctx: &TransformContext, url: &Url) -> Result<Transformable> {
        let body = match &self.body {
            Some(body) if !body.is_empty() => JsonValue::Object(body.clone()),
            _ => JsonValue::Null,
        };
        let mut tr = Transformable::request(url.clone(), self.headers.clone(), body);
        run_all(&self.transforms, ctx, &mut tr)?;

        if self.method == Method::POST && !tr.header.contains_key(CONTENT_TYPE) {
            tr.header
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        debug!(url = %url, method = %self.method, "new request");
        Ok(tr)
    }

    /// Encode a transformable into the request sent on the wire.
    ///
    /// The body is only encoded for POST, with `encode_as` or else the
    /// request `Content-Type`.
    pub fn http_request(&self, mut tr: Transformable) -> Result<HttpRequest> {
        let body = if self.method == Method::POST {
            let encoder = match self.encode_as {
                Some(encoder) => encoder,
                None => EncodeAs::from_content_type(
                    tr.header.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
                ),
            };
            encoder.encode(&mut tr)?
        } else {
            None
        };

        let url = tr
            .url
            .ok_or_else(|| Error::transform("request has no url"))?;
        Ok(HttpRequest {
            method: self.method.into(),
            url,
            header: tr.header,
            body,
        })
    }
}

/// Replace the first occurrence of `pattern` in `url` with `value`.
///
/// For an opaque URL such as `placeholder:$.ids[:]` the scheme is dropped and
/// the remainder is used as the replacement target.
pub fn generate_url(pattern: &str, url: &str, value: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    let target = if parsed.cannot_be_a_base() {
        url.split_once(':').map_or(url, |(_, rest)| rest)
    } else {
        url
    };
    let replaced = target.replacen(pattern, value, 1);
    Url::parse(&replaced)
        .map_err(|e| Error::transform(format!("failed to replace value in url {replaced:?}: {e}")))
}
