//! Compiled templates and their evaluation against a transform context

use super::functions::{self, Env};
use super::parse::{parse, Command, Node, Operand, Pipeline};
use super::value::{url_query, Value};
use crate::context::{ResponseSnapshot, TransformContext};
use crate::error::{Error, Result};
use crate::transform::Transformable;
use crate::types::JsonValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::debug;

/// A template compiled once at load time and executed on every use
#[derive(Debug, Clone)]
pub struct ValueTemplate {
    source: String,
    nodes: Vec<Node>,
}

impl ValueTemplate {
    /// Compile a template, failing on syntax errors and unknown functions
    pub fn compile(source: &str) -> Result<Self> {
        let nodes = parse(source).map_err(|e| match e {
            Error::Template { message } => {
                Error::template(format!("template {source:?}: {message}"))
            }
            other => other,
        })?;
        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against the context and in-flight transformable.
    ///
    /// On failure, or when the result is empty, `default` is rendered against an
    /// empty context instead. Without a default an empty result is
    /// `Error::EmptyTemplateResult` and a failure is returned as is.
    pub fn execute(
        &self,
        ctx: &TransformContext,
        tr: &Transformable,
        default: Option<&ValueTemplate>,
    ) -> Result<String> {
        self.execute_at(ctx, tr, default, Utc::now())
    }

    /// Same as [`execute`](Self::execute) with a fixed clock
    pub fn execute_at(
        &self,
        ctx: &TransformContext,
        tr: &Transformable,
        default: Option<&ValueTemplate>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let env = Env { now };
        let rendered = catch_unwind(AssertUnwindSafe(|| self.render(ctx, tr, &env)))
            .unwrap_or_else(|_| Err(Error::executing("function call panicked")));

        let failure = match rendered {
            Ok(s) if !s.is_empty() => return Ok(s),
            Ok(_) => Error::EmptyTemplateResult,
            Err(e) => {
                debug!(template = %self.source, error = %e, "template execution failed");
                e
            }
        };

        match default {
            Some(default) => {
                debug!(template = %self.source, "template execution: falling back to default value");
                let empty_ctx = TransformContext::default();
                let empty_tr = Transformable::default();
                let value = catch_unwind(AssertUnwindSafe(|| {
                    default.render(&empty_ctx, &empty_tr, &env)
                }))
                .unwrap_or_else(|_| Err(Error::executing("function call panicked")))?;
                if value.is_empty() {
                    Err(Error::EmptyTemplateResult)
                } else {
                    Ok(value)
                }
            }
            None => Err(failure),
        }
    }

    /// Render without any fallback
    fn render(&self, ctx: &TransformContext, tr: &Transformable, env: &Env) -> Result<String> {
        let scope = Scope { ctx, tr, env };
        let mut out = String::new();
        scope.walk(&self.nodes, &mut out)?;
        Ok(out)
    }
}

impl<'de> Deserialize<'de> for ValueTemplate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        ValueTemplate::compile(&source).map_err(serde::de::Error::custom)
    }
}

/// Everything a template can see while it runs
struct Scope<'a> {
    ctx: &'a TransformContext,
    tr: &'a Transformable,
    env: &'a Env,
}

impl Scope<'_> {
    fn walk(&self, nodes: &[Node], out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Action(p) => out.push_str(&self.pipeline(p)?.render()),
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.pipeline(cond)?.is_truthy() {
                        self.walk(then, out)?;
                    } else {
                        self.walk(otherwise, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn pipeline(&self, p: &Pipeline) -> Result<Value> {
        let mut piped: Option<Value> = None;
        for cmd in &p.cmds {
            piped = Some(self.command(cmd, piped.take())?);
        }
        Ok(piped.unwrap_or_else(Value::nil))
    }

    fn command(&self, cmd: &Command, piped: Option<Value>) -> Result<Value> {
        let (head, rest) = cmd
            .args
            .split_first()
            .ok_or_else(|| Error::executing("empty command"))?;

        let mut args = rest
            .iter()
            .map(|a| self.operand(a))
            .collect::<Result<Vec<_>>>()?;
        if let Some(v) = piped {
            args.push(v);
        }

        match head {
            Operand::Func(name) => functions::call(name, self.env, args),
            // a field chain followed by arguments is a method call on its last element
            Operand::Field(path) if !args.is_empty() => {
                let (method, receiver_path) = path
                    .split_last()
                    .ok_or_else(|| Error::executing("empty field"))?;
                let receiver = if receiver_path.is_empty() {
                    return Err(Error::executing(format!(
                        "can't give argument to non-function .{method}"
                    )));
                } else {
                    self.field(receiver_path)?
                };
                receiver.access(method, &args)
            }
            Operand::Chain(base, path) if !args.is_empty() => {
                let (method, receiver_path) = path
                    .split_last()
                    .ok_or_else(|| Error::executing("empty field"))?;
                let mut receiver = self.operand(base)?;
                for name in receiver_path {
                    receiver = receiver.access(name, &[])?;
                }
                receiver.access(method, &args)
            }
            other if args.is_empty() => self.operand(other),
            _ => Err(Error::executing("can't give argument to non-function")),
        }
    }

    fn operand(&self, op: &Operand) -> Result<Value> {
        match op {
            Operand::Dot => Ok(self.root()),
            Operand::Field(path) => self.field(path),
            Operand::Func(name) => functions::call(name, self.env, Vec::new()),
            Operand::Str(s) => Ok(Value::string(s.clone())),
            Operand::Int(i) => Ok(Value::int(*i)),
            Operand::Float(f) => Ok(Value::float(*f)),
            Operand::Bool(b) => Ok(Value::bool(*b)),
            Operand::Nil => Ok(Value::nil()),
            Operand::Paren(p) => self.pipeline(p),
            Operand::Chain(base, path) => {
                let mut v = self.operand(base)?;
                for name in path {
                    v = v.access(name, &[])?;
                }
                Ok(v)
            }
        }
    }

    /// Resolve `.a.b.c` from the root, walking borrowed JSON until the leaf
    fn field(&self, path: &[String]) -> Result<Value> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| Error::executing("empty field"))?;

        let (mut value, rest) = match first.as_str() {
            "cursor" => return walk_json_map(self.ctx.cursor(), rest),
            "first_event" => return walk_json(self.ctx.first_event(), rest),
            "last_event" => return walk_json(self.ctx.last_event(), rest),
            "first_response" => return response_field(self.ctx.first_response(), rest),
            "last_response" => return response_field(self.ctx.last_response(), rest),
            "parent_last_response" => match self.ctx.parent_last_response() {
                Some(r) => return response_field(r, rest),
                None => return Err(missing_key(first)),
            },
            "body" => return walk_json(&self.tr.body, rest),
            "header" => (Value::Header(self.tr.header.clone()), rest),
            "url" => match &self.tr.url {
                Some(u) => (Value::Url(u.clone()), rest),
                None => return Err(missing_key(first)),
            },
            _ => return Err(missing_key(first)),
        };
        for name in rest {
            value = value.access(name, &[])?;
        }
        Ok(value)
    }

    /// The root document as a single value, used by a bare `.`
    fn root(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("cursor".into(), JsonValue::Object(self.ctx.cursor().clone()));
        map.insert("first_event".into(), self.ctx.first_event().clone());
        map.insert("last_event".into(), self.ctx.last_event().clone());
        map.insert("body".into(), self.tr.body.clone());
        Value::Json(JsonValue::Object(map))
    }
}

fn missing_key(name: &str) -> Error {
    Error::undefined_var(format!("map has no entry for key {name:?}"))
}

fn walk_json_map(map: &serde_json::Map<String, JsonValue>, path: &[String]) -> Result<Value> {
    match path.split_first() {
        None => Ok(Value::Json(JsonValue::Object(map.clone()))),
        Some((first, rest)) => {
            let next = map.get(first).ok_or_else(|| missing_key(first))?;
            walk_json(next, rest)
        }
    }
}

fn walk_json(mut current: &JsonValue, path: &[String]) -> Result<Value> {
    for name in path {
        current = match current {
            JsonValue::Object(map) => map.get(name).ok_or_else(|| missing_key(name))?,
            JsonValue::Null => {
                return Err(Error::executing(format!("nil pointer evaluating .{name}")))
            }
            other => {
                return Err(Error::executing(format!(
                    "can't evaluate field {name} in type {}",
                    Value::Json(other.clone()).type_name()
                )))
            }
        };
    }
    Ok(Value::Json(current.clone()))
}

fn response_field(resp: &ResponseSnapshot, path: &[String]) -> Result<Value> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(Value::Json(resp.to_json()));
    };
    let mut value = match first.as_str() {
        "body" => return walk_json(&resp.body, rest),
        "page" => Value::int(resp.page as i64),
        "status_code" => Value::int(i64::from(resp.status)),
        "header" => Value::Header(resp.header.clone()),
        "url" => match rest.split_first() {
            None => Value::string(resp.url.as_ref().map(ToString::to_string).unwrap_or_default()),
            Some((sub, tail)) => {
                let mut v = match (sub.as_str(), &resp.url) {
                    ("value", Some(u)) => Value::string(u.to_string()),
                    ("params", Some(u)) => url_query(u),
                    ("value", None) => Value::string(""),
                    ("params", None) => Value::Query(Vec::new()),
                    _ => return Err(missing_key(sub)),
                };
                for name in tail {
                    v = v.access(name, &[])?;
                }
                return Ok(v);
            }
        },
        _ => return Err(missing_key(first)),
    };
    for name in rest {
        value = value.access(name, &[])?;
    }
    Ok(value)
}
