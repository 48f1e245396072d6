// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dispatched action: a tag routed to a reducer and to bound trigger
/// streams, plus an arbitrary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tag: String,
    #[serde(default)]
    pub payload: Value,
}

impl Action {
    pub fn new(tag: &str, payload: Value) -> Self {
        Self {
            tag: tag.to_string(),
            payload,
        }
    }

    /// An action with no payload.
    pub fn signal(tag: &str) -> Self {
        Self::new(tag, Value::Null)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}
