//! Recursive split walk

use super::types::{SplitConfig, SplitKind};
use crate::context::TransformContext;
use crate::error::{Error, Result};
use crate::transform::{
    get_path, put_path, run_all, Namespace, Target, Transform, TransformRegistry, Transformable,
};
use crate::types::{JsonObject, JsonValue};
use tracing::debug;

/// A compiled split node and its optional child
#[derive(Debug, Clone)]
pub struct Split {
    path: String,
    kind: SplitKind,
    transforms: Vec<Transform>,
    child: Option<Box<Split>>,
    keep_parent: bool,
    key_field: Option<String>,
    delimiter: String,
    ignore_empty_value: bool,
    is_root: bool,
}

impl Split {
    /// Compile the outermost node of a split chain
    pub fn new(config: &SplitConfig, registry: &TransformRegistry) -> Result<Self> {
        Self::compile(config, registry, true)
    }

    fn compile(config: &SplitConfig, registry: &TransformRegistry, is_root: bool) -> Result<Self> {
        let path = match Target::parse(&config.target)? {
            Target::Body(path) => path,
            other => {
                return Err(Error::invalid_value(
                    "split.target",
                    format!("invalid target type: {}", other.kind()),
                ))
            }
        };

        if config.key_field.is_some() && config.kind != SplitKind::Map {
            return Err(Error::invalid_value(
                "split.key_field",
                "key_field can only be used with a map split",
            ));
        }
        let delimiter = match (config.kind, &config.delimiter) {
            (SplitKind::String, Some(d)) if !d.is_empty() => d.clone(),
            (SplitKind::String, _) => {
                return Err(Error::invalid_value(
                    "split.delimiter",
                    "delimiter is required for a string split",
                ))
            }
            (_, Some(_)) => {
                return Err(Error::invalid_value(
                    "split.delimiter",
                    "delimiter can only be used with a string split",
                ))
            }
            (_, None) => String::new(),
        };

        let transforms = registry.build(Namespace::Response, &config.transforms)?;
        let child = config
            .split
            .as_deref()
            .map(|c| Self::compile(c, registry, false).map(Box::new))
            .transpose()?;

        Ok(Self {
            path,
            kind: config.kind,
            transforms,
            child,
            keep_parent: config.keep_parent,
            key_field: config.key_field.clone(),
            delimiter,
            ignore_empty_value: config.ignore_empty_value,
            is_root,
        })
    }

    /// Split `body`, handing every produced event to `emit` in order.
    ///
    /// `Error::EmptyRootField` and `Error::EmptyField` end the walk without
    /// losing events already emitted; see [`Error::is_split_soft_stop`].
    pub fn run(
        &self,
        ctx: &TransformContext,
        body: JsonValue,
        emit: &mut dyn FnMut(JsonValue),
    ) -> Result<()> {
        self.split(ctx, body, emit)
    }

    /// Run and collect the events, returning the walk result alongside
    pub fn collect(&self, ctx: &TransformContext, body: JsonValue) -> (Vec<JsonValue>, Result<()>) {
        let mut events = Vec::new();
        let result = self.run(ctx, body, &mut |e| events.push(e));
        (events, result)
    }

    fn split(
        &self,
        ctx: &TransformContext,
        root: JsonValue,
        emit: &mut dyn FnMut(JsonValue),
    ) -> Result<()> {
        let Some(value) = get_path(&root, &self.path).filter(|v| !v.is_null()) else {
            return self.on_empty(ctx, root, emit);
        };

        match self.kind {
            SplitKind::Array => {
                let JsonValue::Array(items) = value else {
                    return Err(Error::ExpectedArray {
                        path: self.path.clone(),
                    });
                };
                if items.is_empty() {
                    return self.on_empty(ctx, root, emit);
                }
                for item in items.clone() {
                    self.element(ctx, &root, None, item, emit)?;
                }
            }
            SplitKind::Map => {
                let JsonValue::Object(entries) = value else {
                    return Err(Error::ExpectedObject {
                        path: self.path.clone(),
                    });
                };
                if entries.is_empty() {
                    return self.on_empty(ctx, root, emit);
                }
                for (key, item) in entries.clone() {
                    self.element(ctx, &root, Some(key), item, emit)?;
                }
            }
            SplitKind::String => {
                let JsonValue::String(text) = value else {
                    return Err(Error::ExpectedString {
                        path: self.path.clone(),
                    });
                };
                if text.is_empty() {
                    return self.on_empty(ctx, root, emit);
                }
                for piece in text.clone().split(self.delimiter.as_str()) {
                    let mut doc = root.clone();
                    put_path(&mut doc, &self.path, JsonValue::String(piece.to_string()))?;
                    self.finish(ctx, doc, emit)?;
                }
            }
        }
        Ok(())
    }

    fn on_empty(
        &self,
        ctx: &TransformContext,
        root: JsonValue,
        emit: &mut dyn FnMut(JsonValue),
    ) -> Result<()> {
        if self.ignore_empty_value {
            return match &self.child {
                Some(child) => child.split(ctx, root, emit),
                None => Ok(()),
            };
        }
        if self.is_root {
            return Err(Error::EmptyRootField);
        }
        emit(root);
        Err(Error::EmptyField)
    }

    /// Build the document for one collection element.
    ///
    /// Strings and arrays are wrapped as `{"data": ...}`; numbers, bools and
    /// null are rejected.
    fn element(
        &self,
        ctx: &TransformContext,
        root: &JsonValue,
        key: Option<String>,
        item: JsonValue,
        emit: &mut dyn FnMut(JsonValue),
    ) -> Result<()> {
        let mut obj = match item {
            JsonValue::Object(map) => map,
            other @ (JsonValue::String(_) | JsonValue::Array(_)) => {
                let mut wrapped = JsonObject::new();
                wrapped.insert("data".to_string(), other);
                wrapped
            }
            _ => {
                return Err(Error::ExpectedObject {
                    path: self.path.clone(),
                })
            }
        };
        if let (Some(field), Some(key)) = (&self.key_field, key) {
            obj.insert(field.clone(), JsonValue::String(key));
        }

        let doc = if self.keep_parent {
            let mut doc = root.clone();
            put_path(&mut doc, &self.path, JsonValue::Object(obj))?;
            doc
        } else {
            JsonValue::Object(obj)
        };
        self.finish(ctx, doc, emit)
    }

    /// Apply this node's transforms, then recurse or emit
    fn finish(
        &self,
        ctx: &TransformContext,
        doc: JsonValue,
        emit: &mut dyn FnMut(JsonValue),
    ) -> Result<()> {
        let mut tr = Transformable::from_body(doc);
        run_all(&self.transforms, ctx, &mut tr)?;

        let Some(child) = &self.child else {
            emit(tr.body);
            return Ok(());
        };
        match child.split(ctx, tr.body, emit) {
            Err(e) if e.is_split_soft_stop() => {
                debug!(target_path = %child.path, "nested split finished: {e}");
                Ok(())
            }
            other => other,
        }
    }
}
