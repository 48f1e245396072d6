// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::Value;

use crate::graph::{FieldPath, TraitNodeId};
use crate::state::{get_at, remove_at, set_at, DirtySet, Patch, PatchReason};

/// The working copy owned by an open transaction.
///
/// Every write goes through [`Draft::record`], which applies the change,
/// appends a [`Patch`] and marks the path dirty, so the patch log and the
/// draft state never drift apart.
#[derive(Debug, Clone)]
pub struct Draft {
    state: Value,
    patches: Vec<Patch>,
    dirty: DirtySet,
}

/// Restore point used when several coalesced write bodies share one draft.
#[derive(Debug, Clone)]
pub struct Savepoint {
    state: Value,
    patch_count: usize,
    dirty: DirtySet,
}

impl Draft {
    pub fn new(state: Value) -> Self {
        Self {
            state,
            patches: Vec::new(),
            dirty: DirtySet::new(),
        }
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        get_at(&self.state, path)
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    /// Applies `to` at `path` (removing the field when `None`) and logs it.
    pub fn record(
        &mut self,
        path: FieldPath,
        from: Option<Value>,
        to: Option<Value>,
        reason: PatchReason,
        origin_node_id: Option<TraitNodeId>,
        step_id: Option<usize>,
    ) {
        match &to {
            Some(value) => {
                set_at(&mut self.state, &path, value.clone());
            }
            None => {
                remove_at(&mut self.state, &path);
            }
        }
        self.dirty.mark(&path);
        self.patches.push(Patch {
            path,
            from,
            to,
            reason,
            origin_node_id,
            step_id,
        });
    }

    /// Runs an opaque mutation over the whole draft; marks everything dirty.
    pub fn mutate<F: FnOnce(&mut Value)>(&mut self, reason: PatchReason, f: F) {
        f(&mut self.state);
        self.dirty.mark_all();
        self.patches.push(Patch {
            path: FieldPath::root(),
            from: None,
            to: None,
            reason,
            origin_node_id: None,
            step_id: None,
        });
    }

    pub fn savepoint(&self) -> Savepoint {
        Savepoint {
            state: self.state.clone(),
            patch_count: self.patches.len(),
            dirty: self.dirty.clone(),
        }
    }

    pub fn rollback_to(&mut self, savepoint: Savepoint) {
        self.state = savepoint.state;
        self.patches.truncate(savepoint.patch_count);
        self.dirty = savepoint.dirty;
    }

    pub fn into_parts(self) -> (Value, Vec<Patch>) {
        (self.state, self.patches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn test_record_applies_and_logs() {
        let mut draft = Draft::new(json!({"b": 0}));
        draft.record(path("b"), Some(json!(0)), Some(json!(5)), PatchReason::Update, None, None);

        assert_eq!(draft.state(), &json!({"b": 5}));
        assert_eq!(draft.patches().len(), 1);
        assert!(draft.dirty().overlaps(&path("b")));
    }

    #[test]
    fn test_record_none_removes() {
        let mut draft = Draft::new(json!({"errors": {"a": "bad"}}));
        draft.record(path("errors.a"), Some(json!("bad")), None, PatchReason::TraitCheck, None, None);
        assert_eq!(draft.state(), &json!({"errors": {}}));
    }

    #[test]
    fn test_rollback_restores_everything() {
        let mut draft = Draft::new(json!({"b": 0}));
        draft.record(path("b"), Some(json!(0)), Some(json!(1)), PatchReason::Update, None, None);
        let savepoint = draft.savepoint();

        draft.record(path("c"), None, Some(json!(2)), PatchReason::Update, None, None);
        draft.mutate(PatchReason::Mutate, |state| state["d"] = json!(3));
        draft.rollback_to(savepoint);

        assert_eq!(draft.state(), &json!({"b": 1}));
        assert_eq!(draft.patches().len(), 1);
        assert!(!draft.dirty().is_dirty_all());
    }
}
