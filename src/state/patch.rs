// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::graph::{FieldPath, TraitNodeId};

/// Why a patch was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchReason {
    /// Direct write through `update`
    Update,
    /// Opaque whole-draft mutation through `mutate`/`replace`
    Mutate,
    /// Written by an action reducer during `dispatch`
    Reducer,
    TraitComputed,
    TraitLink,
    TraitCheck,
    TraitSource,
    /// Async source result written back after commit
    SourceRefresh,
    Devtools,
    Custom(String),
}

impl fmt::Display for PatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchReason::Update => write!(f, "update"),
            PatchReason::Mutate => write!(f, "mutate"),
            PatchReason::Reducer => write!(f, "reducer"),
            PatchReason::TraitComputed => write!(f, "trait-computed"),
            PatchReason::TraitLink => write!(f, "trait-link"),
            PatchReason::TraitCheck => write!(f, "trait-check"),
            PatchReason::TraitSource => write!(f, "trait-source"),
            PatchReason::SourceRefresh => write!(f, "source-refresh"),
            PatchReason::Devtools => write!(f, "devtools"),
            PatchReason::Custom(reason) => write!(f, "{}", reason),
        }
    }
}

/// One recorded change inside a transaction. Immutable once recorded.
///
/// `from`/`to` are `None` when the field was absent (or, for `$root`
/// mutations, when the change is opaque).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub path: FieldPath,
    pub from: Option<Value>,
    pub to: Option<Value>,
    pub reason: PatchReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_node_id: Option<TraitNodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<usize>,
}
