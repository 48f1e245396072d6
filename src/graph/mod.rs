// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Field paths, trait declarations and the trait graph compiler.

mod compiler;
mod field_path;
mod node;
mod validation;

pub use compiler::{TraitGraph, CLOSURE_BUDGET_CHECK_INTERVAL};
pub use field_path::{FieldPath, ERRORS_SEGMENT, ROOT_SENTINEL};
pub use node::{
    CheckFn, ComputeFn, EqualsFn, KeyFn, TraitEval, TraitInputs, TraitKind, TraitNode,
    TraitNodeId, TraitSpec, TraitSpecEval,
};
