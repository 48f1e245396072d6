// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! State tree access, patches and the per-transaction draft.
//!
//! Module state is a `serde_json::Value` tree addressed by
//! [`FieldPath`](crate::graph::FieldPath). Writes never touch the committed
//! snapshot directly; they go through a [`Draft`] owned by the open
//! transaction.

mod dirty;
mod draft;
mod patch;

pub use dirty::DirtySet;
pub use draft::{Draft, Savepoint};
pub use patch::{Patch, PatchReason};

use serde_json::{Map, Value};

use crate::graph::FieldPath;

/// Reads the value at `path`, if present.
pub fn get_at<'a>(state: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = state;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects as needed.
/// Non-object intermediates are replaced. Returns the previous value.
pub fn set_at(state: &mut Value, path: &FieldPath, value: Value) -> Option<Value> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Some(std::mem::replace(state, value));
    };

    let mut current = state;
    for segment in parents {
        current = ensure_object(current)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert(last.clone(), value)
}

/// Removes the value at `path`. Removing `$root` resets the state to `null`.
pub fn remove_at(state: &mut Value, path: &FieldPath) -> Option<Value> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Some(std::mem::replace(state, Value::Null));
    };

    let mut current = state;
    for segment in parents {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    current.as_object_mut()?.remove(last)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
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
    fn test_get_nested() {
        let state = json!({"a": {"b": 1}});
        assert_eq!(get_at(&state, &path("a.b")), Some(&json!(1)));
        assert_eq!(get_at(&state, &path("a.c")), None);
        assert_eq!(get_at(&state, &FieldPath::root()), Some(&state));
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut state = json!({});
        let previous = set_at(&mut state, &path("errors.form.email"), json!("required"));
        assert_eq!(previous, None);
        assert_eq!(state, json!({"errors": {"form": {"email": "required"}}}));
    }

    #[test]
    fn test_set_returns_previous() {
        let mut state = json!({"b": 0});
        assert_eq!(set_at(&mut state, &path("b"), json!(5)), Some(json!(0)));
        assert_eq!(state, json!({"b": 5}));
    }

    #[test]
    fn test_set_replaces_scalar_intermediate() {
        let mut state = json!({"a": 3});
        set_at(&mut state, &path("a.b"), json!(true));
        assert_eq!(state, json!({"a": {"b": true}}));
    }

    #[test]
    fn test_remove() {
        let mut state = json!({"errors": {"email": "bad", "name": "bad"}});
        assert_eq!(remove_at(&mut state, &path("errors.email")), Some(json!("bad")));
        assert_eq!(remove_at(&mut state, &path("errors.missing")), None);
        assert_eq!(state, json!({"errors": {"name": "bad"}}));
    }
}
