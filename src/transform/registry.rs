//! Table of transform constructors keyed by namespace and name

use super::ops::{Transform, TransformKind};
use super::types::{Namespace, Target, TransformConfig, TransformSpec, ValueType};
use crate::error::{Error, Result};
use crate::template::ValueTemplate;
use std::collections::HashMap;

type Constructor = fn(Namespace, &TransformConfig) -> Result<Transform>;

/// Built once and passed to every pipeline builder
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    constructors: HashMap<(Namespace, &'static str), Constructor>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TransformRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// `set`, `append` and `delete` in every namespace
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for ns in [Namespace::Request, Namespace::Pagination, Namespace::Response] {
            registry.register(ns, "set", new_set);
            registry.register(ns, "append", new_append);
            registry.register(ns, "delete", new_delete);
        }
        registry
    }

    pub fn register(&mut self, namespace: Namespace, name: &'static str, ctor: Constructor) {
        self.constructors.insert((namespace, name), ctor);
    }

    /// Compile a transform list for one namespace
    pub fn build(&self, namespace: Namespace, specs: &[TransformSpec]) -> Result<Vec<Transform>> {
        let mut out = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let mut entries = spec.iter();
            let (Some((name, cfg)), None) = (entries.next(), entries.next()) else {
                return Err(Error::invalid_value(
                    format!("{namespace}.transforms[{i}]"),
                    "each transform must have exactly one of set, append or delete",
                ));
            };
            let ctor = self
                .constructors
                .iter()
                .find(|((ns, n), _)| *ns == namespace && *n == name.as_str())
                .map(|(_, c)| *c)
                .ok_or_else(|| {
                    Error::invalid_value(
                        format!("{namespace}.transforms[{i}]"),
                        format!("the transform {name} does not exist. Valid transforms: set, append, delete"),
                    )
                })?;
            out.push(ctor(namespace, cfg)?);
        }
        Ok(out)
    }
}

fn check_target(namespace: Namespace, kind: TransformKind, target: &Target) -> Result<()> {
    let allowed = match (namespace, target) {
        (_, Target::Body(_)) => true,
        (Namespace::Response, _) => false,
        (Namespace::Pagination, Target::UrlValue) => kind == TransformKind::Set,
        (_, Target::UrlValue) => false,
        (_, Target::Header(_) | Target::UrlParam(_)) => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::invalid_value(
            "target",
            format!(
                "invalid target type {} for {} in namespace {namespace}",
                target.kind(),
                kind.name()
            ),
        ))
    }
}

fn compile_opt(field: &str, source: Option<&String>) -> Result<Option<ValueTemplate>> {
    source
        .filter(|s| !s.is_empty())
        .map(|s| {
            ValueTemplate::compile(s).map_err(|e| Error::invalid_value(field.to_string(), e.to_string()))
        })
        .transpose()
}

fn new_valued(namespace: Namespace, kind: TransformKind, cfg: &TransformConfig) -> Result<Transform> {
    let target = Target::parse(&cfg.target)?;
    check_target(namespace, kind, &target)?;
    if cfg.value_type != ValueType::String && !matches!(target, Target::Body(_)) {
        return Err(Error::invalid_value(
            "value_type",
            format!("only string values can be written to {target}"),
        ));
    }
    Ok(Transform {
        kind,
        target,
        namespace,
        value: compile_opt("value", cfg.value.as_ref())?,
        default: compile_opt("default", cfg.default.as_ref())?,
        value_type: cfg.value_type,
        fail_on_template_error: cfg.fail_on_template_error,
        do_not_log_failure: cfg.do_not_log_failure,
    })
}

fn new_set(namespace: Namespace, cfg: &TransformConfig) -> Result<Transform> {
    new_valued(namespace, TransformKind::Set, cfg)
}

fn new_append(namespace: Namespace, cfg: &TransformConfig) -> Result<Transform> {
    new_valued(namespace, TransformKind::Append, cfg)
}

fn new_delete(namespace: Namespace, cfg: &TransformConfig) -> Result<Transform> {
    let target = Target::parse(&cfg.target)?;
    check_target(namespace, TransformKind::Delete, &target)?;
    Ok(Transform {
        kind: TransformKind::Delete,
        target,
        namespace,
        value: None,
        default: None,
        value_type: ValueType::String,
        fail_on_template_error: false,
        do_not_log_failure: cfg.do_not_log_failure,
    })
}
