// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Snapshot values held by `source` traits and the refresh requests that
//! convergence hands to the module after commit.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::{FieldPath, TraitNodeId};
use crate::traits::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// What a source field holds: `{status, key, data, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub status: SourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceSnapshot {
    pub fn idle() -> Self {
        Self {
            status: SourceStatus::Idle,
            key: None,
            data: None,
            error: None,
        }
    }

    /// Loading keeps the previous data so readers can show stale results.
    pub fn loading(key: Value, previous_data: Option<Value>) -> Self {
        Self {
            status: SourceStatus::Loading,
            key: Some(key),
            data: previous_data,
            error: None,
        }
    }

    pub fn success(key: Value, data: Value) -> Self {
        Self {
            status: SourceStatus::Success,
            key: Some(key),
            data: Some(data),
            error: None,
        }
    }

    pub fn error(key: Value, error: String) -> Self {
        Self {
            status: SourceStatus::Error,
            key: Some(key),
            data: None,
            error: Some(error),
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A load scheduled by convergence, executed after the commit that wrote
/// the matching `loading` snapshot.
#[derive(Clone)]
pub struct SourceRefresh {
    pub node_id: TraitNodeId,
    pub field_path: FieldPath,
    pub key: Value,
    pub resource: Arc<dyn Resource>,
}

impl fmt::Debug for SourceRefresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRefresh")
            .field("node_id", &self.node_id)
            .field("field_path", &self.field_path.to_string())
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_value_shape() {
        let snapshot = SourceSnapshot::loading(json!("u1"), None);
        assert_eq!(snapshot.to_value(), json!({"status": "loading", "key": "u1"}));
        assert_eq!(SourceSnapshot::idle().to_value(), json!({"status": "idle"}));
    }

    #[test]
    fn test_snapshot_parses_back() {
        let value = json!({"status": "success", "key": 7, "data": {"name": "Ada"}});
        let snapshot = SourceSnapshot::from_value(&value).unwrap();
        assert_eq!(snapshot.status, SourceStatus::Success);
        assert_eq!(snapshot.data, Some(json!({"name": "Ada"})));
    }
}
