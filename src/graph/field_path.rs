// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Canonical dot-separated addressing into a module's state tree.
//!
//! A [`FieldPath`] is an ordered, non-empty sequence of named segments such as
//! `profile.address.city`. Bracket syntax (`items[0]`) and purely numeric
//! segments (`items.0`) are rejected: traits address named fields only. The
//! reserved sentinel `$root` addresses the whole state.
//!
//! # Examples
//!
//! ```rust
//! use the_statewood::graph::FieldPath;
//!
//! let city = FieldPath::parse("profile.address.city").unwrap();
//! let profile = FieldPath::parse("profile").unwrap();
//!
//! assert!(profile.is_prefix_of(&city));
//! assert!(city.overlaps(&profile));
//! assert!(FieldPath::parse("items[0]").is_err());
//! assert!(FieldPath::parse("$root").unwrap().is_root());
//! ```

use std::fmt;

use serde::{Serialize, Serializer};

use crate::errors::PathError;

/// The reserved sentinel meaning "the whole state".
pub const ROOT_SENTINEL: &str = "$root";

/// Segment under which `check` traits publish their errors.
pub const ERRORS_SEGMENT: &str = "errors";

/// A validated path into the state tree. `$root` has no segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses and validates a dot-separated path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if raw == ROOT_SENTINEL {
            return Ok(Self::root());
        }
        if raw.contains('[') || raw.contains(']') {
            return Err(PathError::BracketSyntax {
                path: raw.to_string(),
            });
        }

        let mut segments = Vec::new();
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(PathError::EmptySegment {
                    path: raw.to_string(),
                });
            }
            if segment == ROOT_SENTINEL {
                return Err(PathError::ReservedSegment {
                    path: raw.to_string(),
                });
            }
            if segment.chars().all(|c| c.is_ascii_digit()) {
                return Err(PathError::NumericSegment {
                    path: raw.to_string(),
                    segment: segment.to_string(),
                });
            }
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns `child` appended below this path.
    pub fn join(&self, child: &FieldPath) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.extend(child.segments.iter().cloned());
        FieldPath { segments }
    }

    /// The side location a `check` trait on this path writes to.
    pub fn errors_path(&self) -> FieldPath {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push(ERRORS_SEGMENT.to_string());
        segments.extend(self.segments.iter().cloned());
        FieldPath { segments }
    }

    /// True when `self` equals `other` or is one of its ancestors.
    /// `$root` is a prefix of every path.
    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    /// True when a write to one path can change the value seen at the other.
    pub fn overlaps(&self, other: &FieldPath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// Every proper ancestor from `$root` down to the parent, then `self`.
    pub fn prefixes(&self) -> impl Iterator<Item = FieldPath> + '_ {
        (0..=self.segments.len()).map(move |n| FieldPath {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// Compares against a dotted string without allocating.
    pub fn matches_str(&self, raw: &str) -> bool {
        if raw == ROOT_SENTINEL {
            return self.is_root();
        }
        let mut parts = raw.split('.');
        for segment in &self.segments {
            match parts.next() {
                Some(part) if part == segment => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(ROOT_SENTINEL);
        }
        f.write_str(&self.segments.join("."))
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl std::str::FromStr for FieldPath {
    type Err = PathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(raw)
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = PathError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        FieldPath::parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_and_nested() {
        let path = FieldPath::parse("a.b.c").unwrap();
        assert_eq!(path.segments(), &["a", "b", "c"]);
        assert_eq!(path.to_string(), "a.b.c");
    }

    #[test]
    fn test_root_sentinel() {
        let root = FieldPath::parse("$root").unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "$root");
        assert!(root.is_prefix_of(&FieldPath::parse("anything").unwrap()));
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert_eq!(FieldPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            FieldPath::parse("a..b"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            FieldPath::parse(".a"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            FieldPath::parse("items[0]"),
            Err(PathError::BracketSyntax { .. })
        ));
        assert!(matches!(
            FieldPath::parse("items.0"),
            Err(PathError::NumericSegment { segment, .. }) if segment == "0"
        ));
        assert!(matches!(
            FieldPath::parse("a.$root"),
            Err(PathError::ReservedSegment { .. })
        ));
    }

    #[test]
    fn test_alphanumeric_segments_are_allowed() {
        assert!(FieldPath::parse("b3").is_ok());
        assert!(FieldPath::parse("v2.items").is_ok());
    }

    #[test]
    fn test_overlap_is_prefix_either_way() {
        let a = FieldPath::parse("a").unwrap();
        let ab = FieldPath::parse("a.b").unwrap();
        let ac = FieldPath::parse("a.c").unwrap();
        let abc = FieldPath::parse("abc").unwrap();

        assert!(a.overlaps(&ab));
        assert!(ab.overlaps(&a));
        assert!(!ab.overlaps(&ac));
        assert!(!a.overlaps(&abc));
    }

    #[test]
    fn test_errors_path() {
        let path = FieldPath::parse("form.email").unwrap();
        assert_eq!(path.errors_path().to_string(), "errors.form.email");
    }

    #[test]
    fn test_prefixes_walk_from_root() {
        let path = FieldPath::parse("a.b").unwrap();
        let prefixes: Vec<String> = path.prefixes().map(|p| p.to_string()).collect();
        assert_eq!(prefixes, vec!["$root", "a", "a.b"]);
    }

    #[test]
    fn test_matches_str() {
        let path = FieldPath::parse("a.b").unwrap();
        assert!(path.matches_str("a.b"));
        assert!(!path.matches_str("a"));
        assert!(!path.matches_str("a.b.c"));
        assert!(FieldPath::root().matches_str("$root"));
    }
}
