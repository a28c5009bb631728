//! `set`, `append` and `delete`

use super::path::{delete_path, get_path, put_path};
use super::types::{Namespace, Target, Transformable, ValueType};
use crate::context::TransformContext;
use crate::error::{Error, Result};
use crate::template::ValueTemplate;
use crate::types::JsonValue;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Set,
    Append,
    Delete,
}

impl TransformKind {
    pub fn name(self) -> &'static str {
        match self {
            TransformKind::Set => "set",
            TransformKind::Append => "append",
            TransformKind::Delete => "delete",
        }
    }
}

/// A compiled transform
#[derive(Debug, Clone)]
pub struct Transform {
    pub kind: TransformKind,
    pub target: Target,
    pub namespace: Namespace,
    pub value: Option<ValueTemplate>,
    pub default: Option<ValueTemplate>,
    pub value_type: ValueType,
    pub fail_on_template_error: bool,
    pub do_not_log_failure: bool,
}

impl Transform {
    /// Apply to `tr`; returns whether the target was written
    pub fn run(&self, ctx: &TransformContext, tr: &mut Transformable) -> Result<bool> {
        if self.kind == TransformKind::Delete {
            return self.delete(tr);
        }

        let Some(template) = &self.value else {
            return Ok(false);
        };
        let rendered = match template.execute(ctx, tr, self.default.as_ref()) {
            Ok(v) => v,
            Err(e) if self.fail_on_template_error => {
                return Err(Error::transform(format!(
                    "failed to execute template of {} transform on {}: {e}",
                    self.kind.name(),
                    self.target
                )))
            }
            Err(e) => {
                if !self.do_not_log_failure {
                    debug!(
                        target_field = %self.target,
                        namespace = %self.namespace,
                        error = %e,
                        "transform template produced no value"
                    );
                }
                return Ok(false);
            }
        };

        let value = self.typed_value(&rendered)?;
        match self.kind {
            TransformKind::Set => self.set(tr, value)?,
            TransformKind::Append => self.append(tr, value)?,
            TransformKind::Delete => unreachable!("delete handled above"),
        }
        Ok(true)
    }

    fn typed_value(&self, rendered: &str) -> Result<JsonValue> {
        match self.value_type {
            ValueType::String => Ok(JsonValue::String(rendered.to_string())),
            ValueType::Int => rendered
                .trim()
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|e| {
                    Error::transform(format!(
                        "failed to convert {rendered:?} to int for {}: {e}",
                        self.target
                    ))
                }),
            ValueType::Json => serde_json::from_str(rendered).map_err(|e| {
                Error::transform(format!(
                    "failed to parse {rendered:?} as json for {}: {e}",
                    self.target
                ))
            }),
        }
    }

    fn string_value<'a>(&self, value: &'a JsonValue) -> Result<&'a str> {
        value.as_str().ok_or_else(|| {
            Error::transform(format!("value for {} must be a string", self.target))
        })
    }

    fn set(&self, tr: &mut Transformable, value: JsonValue) -> Result<()> {
        match &self.target {
            Target::Body(path) => put_path(&mut tr.body, path, value),
            Target::Header(name) => {
                let (name, value) = header_pair(name, self.string_value(&value)?)?;
                tr.header.insert(name, value);
                Ok(())
            }
            Target::UrlParam(param) => {
                let v = self.string_value(&value)?.to_string();
                let url = request_url(tr)?;
                let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
                match pairs.iter().position(|(k, _)| k == param) {
                    Some(first) => {
                        pairs[first].1 = v;
                        let mut i = 0;
                        pairs.retain(|(k, _)| {
                            let keep = k != param || i == first;
                            i += 1;
                            keep
                        });
                    }
                    None => pairs.push((param.clone(), v)),
                }
                write_query(url, &pairs);
                Ok(())
            }
            Target::UrlValue => {
                let raw = self.string_value(&value)?;
                tr.url = Some(Url::parse(raw).map_err(|e| {
                    Error::transform(format!("failed to parse url {raw:?}: {e}"))
                })?);
                Ok(())
            }
        }
    }

    fn append(&self, tr: &mut Transformable, value: JsonValue) -> Result<()> {
        match &self.target {
            Target::Body(path) => {
                let next = match get_path(&tr.body, path) {
                    None => value,
                    Some(JsonValue::Array(items)) => {
                        let mut items = items.clone();
                        items.push(value);
                        JsonValue::Array(items)
                    }
                    Some(prev) => JsonValue::Array(vec![prev.clone(), value]),
                };
                put_path(&mut tr.body, path, next)
            }
            Target::Header(name) => {
                let (name, value) = header_pair(name, self.string_value(&value)?)?;
                tr.header.append(name, value);
                Ok(())
            }
            Target::UrlParam(param) => {
                let v = self.string_value(&value)?.to_string();
                let url = request_url(tr)?;
                let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
                pairs.push((param.clone(), v));
                write_query(url, &pairs);
                Ok(())
            }
            Target::UrlValue => Err(Error::transform("url.value can only be set")),
        }
    }

    fn delete(&self, tr: &mut Transformable) -> Result<bool> {
        match &self.target {
            Target::Body(path) => Ok(delete_path(&mut tr.body, path)),
            Target::Header(name) => Ok(tr.header.remove(name.as_str()).is_some()),
            Target::UrlParam(param) => {
                let url = request_url(tr)?;
                let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
                let kept: Vec<(String, String)> =
                    pairs.iter().filter(|(k, _)| k != param).cloned().collect();
                let removed = kept.len() != pairs.len();
                write_query(url, &kept);
                Ok(removed)
            }
            Target::UrlValue => Err(Error::transform("url.value can only be set")),
        }
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::transform(format!("invalid header name {name:?}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::transform(format!("invalid header value for {name}: {e}")))?;
    Ok((name, value))
}

fn request_url(tr: &mut Transformable) -> Result<&mut Url> {
    tr.url
        .as_mut()
        .ok_or_else(|| Error::transform("no url to transform"))
}

fn write_query(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        url.set_query(None);
        return;
    }
    url.query_pairs_mut().clear().extend_pairs(pairs.iter());
}

/// Run transforms in order; returns how many wrote their target
pub fn run_all(
    transforms: &[Transform],
    ctx: &TransformContext,
    tr: &mut Transformable,
) -> Result<usize> {
    let mut applied = 0;
    for t in transforms {
        if t.run(ctx, tr)? {
            applied += 1;
        }
    }
    Ok(applied)
}
