// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Trait declarations and the compiled nodes they become.
//!
//! A [`TraitSpec`] is what module authors declare: a target field, its
//! dependencies and one evaluation function per kind. Compilation validates
//! the paths and turns each spec into an immutable [`TraitNode`].
//!
//! ```rust
//! use serde_json::{json, Value};
//! use the_statewood::graph::TraitSpec;
//!
//! let total = TraitSpec::computed("total", ["price", "qty"], |inputs| {
//!     let price = inputs.get("price").and_then(Value::as_f64).unwrap_or(0.0);
//!     let qty = inputs.get("qty").and_then(Value::as_f64).unwrap_or(0.0);
//!     json!(price * qty)
//! });
//! let mirror = TraitSpec::link("summary.total", "total");
//! let required = TraitSpec::check("email", ["email"], |inputs| match inputs.get("email") {
//!     Some(Value::String(s)) if !s.is_empty() => None,
//!     _ => Some(json!("required")),
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::graph::FieldPath;
use crate::state::get_at;
use crate::traits::Resource;

/// Index of a node in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TraitNodeId(pub usize);

impl fmt::Display for TraitNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitKind {
    Computed,
    Source,
    Link,
    Check,
}

impl fmt::Display for TraitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraitKind::Computed => write!(f, "computed"),
            TraitKind::Source => write!(f, "source"),
            TraitKind::Link => write!(f, "link"),
            TraitKind::Check => write!(f, "check"),
        }
    }
}

pub type ComputeFn = Arc<dyn Fn(&TraitInputs<'_>) -> Value + Send + Sync>;
pub type EqualsFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;
pub type CheckFn = Arc<dyn Fn(&TraitInputs<'_>) -> Option<Value> + Send + Sync>;
pub type KeyFn = Arc<dyn Fn(&TraitInputs<'_>) -> Option<Value> + Send + Sync>;

/// One evaluation function per trait kind.
#[derive(Clone)]
pub enum TraitEval {
    Computed {
        derive: ComputeFn,
        equals: Option<EqualsFn>,
    },
    Source {
        key: KeyFn,
        resource: Arc<dyn Resource>,
    },
    Link {
        from: FieldPath,
    },
    Check {
        validate: CheckFn,
    },
}

impl TraitEval {
    pub fn kind(&self) -> TraitKind {
        match self {
            TraitEval::Computed { .. } => TraitKind::Computed,
            TraitEval::Source { .. } => TraitKind::Source,
            TraitEval::Link { .. } => TraitKind::Link,
            TraitEval::Check { .. } => TraitKind::Check,
        }
    }
}

/// Evaluator-side declaration body. Link sources are kept as raw strings
/// until compilation validates them.
#[derive(Clone)]
pub enum TraitSpecEval {
    Computed {
        derive: ComputeFn,
        equals: Option<EqualsFn>,
    },
    Source {
        key: KeyFn,
        resource: Arc<dyn Resource>,
    },
    Link {
        from: String,
    },
    Check {
        validate: CheckFn,
    },
}

/// A trait as declared by a module author.
#[derive(Clone)]
pub struct TraitSpec {
    pub field_path: String,
    pub deps: Vec<String>,
    pub eval: TraitSpecEval,
}

impl TraitSpec {
    /// A field derived purely from `deps`.
    pub fn computed<I, S, F>(field_path: &str, deps: I, derive: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&TraitInputs<'_>) -> Value + Send + Sync + 'static,
    {
        Self {
            field_path: field_path.to_string(),
            deps: deps.into_iter().map(Into::into).collect(),
            eval: TraitSpecEval::Computed {
                derive: Arc::new(derive),
                equals: None,
            },
        }
    }

    /// Copies `from` into `field_path`.
    pub fn link(field_path: &str, from: &str) -> Self {
        Self {
            field_path: field_path.to_string(),
            deps: vec![from.to_string()],
            eval: TraitSpecEval::Link {
                from: from.to_string(),
            },
        }
    }

    /// Validates `deps`; a `Some` result is written to `errors.<field_path>`.
    pub fn check<I, S, F>(field_path: &str, deps: I, validate: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&TraitInputs<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            field_path: field_path.to_string(),
            deps: deps.into_iter().map(Into::into).collect(),
            eval: TraitSpecEval::Check {
                validate: Arc::new(validate),
            },
        }
    }

    /// A field loaded asynchronously from `resource`, keyed by `key`.
    pub fn source<I, S, F, R>(field_path: &str, deps: I, key: F, resource: R) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&TraitInputs<'_>) -> Option<Value> + Send + Sync + 'static,
        R: Resource + 'static,
    {
        Self {
            field_path: field_path.to_string(),
            deps: deps.into_iter().map(Into::into).collect(),
            eval: TraitSpecEval::Source {
                key: Arc::new(key),
                resource: Arc::new(resource),
            },
        }
    }

    /// Replaces structural equality for a computed trait.
    /// Has no effect on other kinds.
    pub fn with_equals<F>(mut self, equals: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        if let TraitSpecEval::Computed { equals: slot, .. } = &mut self.eval {
            *slot = Some(Arc::new(equals));
        }
        self
    }

    pub fn kind(&self) -> TraitKind {
        match self.eval {
            TraitSpecEval::Computed { .. } => TraitKind::Computed,
            TraitSpecEval::Source { .. } => TraitKind::Source,
            TraitSpecEval::Link { .. } => TraitKind::Link,
            TraitSpecEval::Check { .. } => TraitKind::Check,
        }
    }
}

impl fmt::Debug for TraitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraitSpec")
            .field("field_path", &self.field_path)
            .field("kind", &self.kind())
            .field("deps", &self.deps)
            .finish()
    }
}

/// A compiled, immutable trait node.
#[derive(Clone)]
pub struct TraitNode {
    pub id: TraitNodeId,
    pub field_path: FieldPath,
    pub deps: Vec<FieldPath>,
    pub eval: TraitEval,
}

impl TraitNode {
    pub fn kind(&self) -> TraitKind {
        self.eval.kind()
    }

    /// Where evaluation writes: the field itself, or `errors.<field>` for checks.
    pub fn write_target(&self) -> FieldPath {
        match self.eval {
            TraitEval::Check { .. } => self.field_path.errors_path(),
            _ => self.field_path.clone(),
        }
    }
}

impl fmt::Debug for TraitNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraitNode")
            .field("id", &self.id)
            .field("field_path", &self.field_path.to_string())
            .field("kind", &self.kind())
            .field("deps", &self.deps.iter().map(|d| d.to_string()).collect::<Vec<_>>())
            .finish()
    }
}

/// Read-only view handed to evaluators. Only declared deps (and paths below
/// them) are visible.
pub struct TraitInputs<'a> {
    state: &'a Value,
    deps: &'a [FieldPath],
}

impl<'a> TraitInputs<'a> {
    pub(crate) fn new(state: &'a Value, deps: &'a [FieldPath]) -> Self {
        Self { state, deps }
    }

    /// Value at a dotted path inside one of the declared deps.
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        let Ok(parsed) = FieldPath::parse(path) else {
            tracing::debug!(path, "trait read of malformed path");
            return None;
        };
        if !self.deps.iter().any(|dep| dep.is_prefix_of(&parsed)) {
            tracing::debug!(path, "trait read of undeclared dependency");
            return None;
        }
        get_at(self.state, &parsed)
    }

    /// Value of the `index`-th declared dep.
    pub fn dep(&self, index: usize) -> Option<&'a Value> {
        self.deps.get(index).and_then(|dep| get_at(self.state, dep))
    }

    pub fn deps(&self) -> &'a [FieldPath] {
        self.deps
    }
}
