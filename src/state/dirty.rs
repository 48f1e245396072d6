// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;

use crate::graph::FieldPath;

/// Field paths written in the current transaction.
///
/// A write to `$root` (or an opaque mutation) marks the whole set dirty, after
/// which every path overlaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirtySet {
    roots: BTreeSet<FieldPath>,
    all: bool,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, path: &FieldPath) {
        if path.is_root() {
            self.all = true;
            return;
        }
        if !self.roots.contains(path) {
            self.roots.insert(path.clone());
        }
    }

    pub fn mark_all(&mut self) {
        self.all = true;
    }

    pub fn is_dirty_all(&self) -> bool {
        self.all
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.roots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn roots(&self) -> impl Iterator<Item = &FieldPath> {
        self.roots.iter()
    }

    /// True when a dirty path overlaps `path` by prefix in either direction.
    pub fn overlaps(&self, path: &FieldPath) -> bool {
        self.all || self.roots.iter().any(|root| root.overlaps(path))
    }

    /// Stable key describing the dirty roots, used for plan caching.
    pub fn cache_key(&self) -> String {
        let mut key = String::new();
        for (i, root) in self.roots.iter().enumerate() {
            if i > 0 {
                key.push('|');
            }
            key.push_str(&root.to_string());
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn test_overlap_by_prefix() {
        let mut dirty = DirtySet::new();
        dirty.mark(&path("profile.name"));

        assert!(dirty.overlaps(&path("profile")));
        assert!(dirty.overlaps(&path("profile.name.first")));
        assert!(!dirty.overlaps(&path("profile.age")));
    }

    #[test]
    fn test_root_write_marks_all() {
        let mut dirty = DirtySet::new();
        dirty.mark(&FieldPath::root());
        assert!(dirty.is_dirty_all());
        assert!(dirty.overlaps(&path("anything")));
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let mut first = DirtySet::new();
        first.mark(&path("b"));
        first.mark(&path("a"));
        let mut second = DirtySet::new();
        second.mark(&path("a"));
        second.mark(&path("b"));
        second.mark(&path("a"));
        assert_eq!(first.cache_key(), second.cache_key());
        assert_eq!(first.cache_key(), "a|b");
    }
}
