// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

use crate::errors::PathError;

/// Structural errors raised while compiling trait declarations into a graph.
///
/// These are fatal: a module whose traits fail to compile never reaches its
/// run phase.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The declared dependencies form a cycle
    TraitCycle {
        /// Field paths along the cycle, first entry repeated at the end
        cycle: Vec<String>,
    },
    /// More than one trait writes to the same field
    DuplicateFieldOwner {
        /// The contested write target
        field_path: String,
        /// Declaration indices of every owner, in declaration order
        owners: Vec<usize>,
    },
    /// A trait declaration names a malformed path
    InvalidFieldPath {
        /// Declaration index of the offending trait
        declaration: usize,
        /// Why the path was rejected
        source: PathError,
    },
    /// A trait tried to own the whole state
    RootTarget {
        /// Declaration index of the offending trait
        declaration: usize,
    },
}

impl GraphError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::TraitCycle { .. } => "trait_cycle",
            GraphError::DuplicateFieldOwner { .. } => "duplicate_field_owner",
            GraphError::InvalidFieldPath { .. } => "invalid_field_path",
            GraphError::RootTarget { .. } => "root_target",
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::TraitCycle { cycle } => {
                write!(f, "trait_cycle: {}", cycle.join(" -> "))
            }
            GraphError::DuplicateFieldOwner { field_path, owners } => {
                write!(
                    f,
                    "duplicate_field_owner: '{}' is written by {} traits (declarations {:?})",
                    field_path,
                    owners.len(),
                    owners
                )
            }
            GraphError::InvalidFieldPath {
                declaration,
                source,
            } => {
                write!(f, "invalid_field_path in trait #{}: {}", declaration, source)
            }
            GraphError::RootTarget { declaration } => {
                write!(
                    f,
                    "root_target: trait #{} cannot own '$root'",
                    declaration
                )
            }
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::InvalidFieldPath { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Every structural error found in one compilation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphErrors(pub Vec<GraphError>);

impl GraphErrors {
    pub fn iter(&self) -> impl Iterator<Item = &GraphError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when any accumulated error carries `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.0.iter().any(|e| e.code() == code)
    }
}

impl fmt::Display for GraphErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphErrors {}

impl From<Vec<GraphError>> for GraphErrors {
    fn from(errors: Vec<GraphError>) -> Self {
        Self(errors)
    }
}
