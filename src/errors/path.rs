// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Reasons a string is rejected as a field path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("field path is empty")]
    Empty,

    #[error("field path '{path}' contains an empty segment")]
    EmptySegment { path: String },

    #[error("field path '{path}' uses bracket syntax; use dot-separated segments instead")]
    BracketSyntax { path: String },

    #[error("field path '{path}' contains numeric segment '{segment}'")]
    NumericSegment { path: String, segment: String },

    #[error("field path '{path}' uses the reserved '$root' sentinel as a segment")]
    ReservedSegment { path: String },
}
