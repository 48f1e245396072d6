// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::state::PatchReason;

/// What opened a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginKind {
    Dispatch,
    #[serde(rename = "task:pending")]
    TaskPending,
    ServiceCallback,
    SourceRefresh,
    Devtools,
    Custom,
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginKind::Dispatch => write!(f, "dispatch"),
            OriginKind::TaskPending => write!(f, "task:pending"),
            OriginKind::ServiceCallback => write!(f, "service-callback"),
            OriginKind::SourceRefresh => write!(f, "source-refresh"),
            OriginKind::Devtools => write!(f, "devtools"),
            OriginKind::Custom => write!(f, "custom"),
        }
    }
}

/// Backlog lane a queued write waits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnLane {
    Urgent,
    NonUrgent,
}

/// `{kind, name?}`. Two requests with equal origins may be coalesced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxnOrigin {
    kind: OriginKind,
    name: Option<Arc<str>>,
}

impl TxnOrigin {
    pub fn new(kind: OriginKind, name: Option<&str>) -> Self {
        Self {
            kind,
            name: name.map(Arc::from),
        }
    }

    pub fn dispatch(tag: &str) -> Self {
        Self::new(OriginKind::Dispatch, Some(tag))
    }

    pub fn task_pending(name: &str) -> Self {
        Self::new(OriginKind::TaskPending, Some(name))
    }

    pub fn service_callback(name: &str) -> Self {
        Self::new(OriginKind::ServiceCallback, Some(name))
    }

    pub fn source_refresh(field_path: &str) -> Self {
        Self::new(OriginKind::SourceRefresh, Some(field_path))
    }

    pub fn devtools() -> Self {
        Self::new(OriginKind::Devtools, None)
    }

    pub fn custom(name: &str) -> Self {
        Self::new(OriginKind::Custom, Some(name))
    }

    pub fn kind(&self) -> OriginKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Source write-backs yield to everything else.
    pub fn lane(&self) -> TxnLane {
        match self.kind {
            OriginKind::SourceRefresh => TxnLane::NonUrgent,
            _ => TxnLane::Urgent,
        }
    }

    /// Reason stamped on patches written through a handle with this origin.
    pub fn patch_reason(&self) -> PatchReason {
        match self.kind {
            OriginKind::Dispatch => PatchReason::Reducer,
            OriginKind::SourceRefresh => PatchReason::SourceRefresh,
            OriginKind::Devtools => PatchReason::Devtools,
            _ => PatchReason::Update,
        }
    }
}

impl fmt::Display for TxnOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", self.kind, name),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Serialize for TxnOrigin {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
