// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// How much the runtime reports on the diagnostics stream.
///
/// Ordered: `Off < Light < Full`. An event is emitted when the configured
/// level is at least the event's required level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsLevel {
    #[default]
    Off,
    Light,
    Full,
}

impl fmt::Display for DiagnosticsLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticsLevel::Off => write!(f, "off"),
            DiagnosticsLevel::Light => write!(f, "light"),
            DiagnosticsLevel::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// Backlog snapshots from the writer lane
    TxnLane,
    /// Convergence decision and step statistics
    TraitDecision,
    /// Committed patch lists
    Patch,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::TxnLane => write!(f, "txn-lane"),
            DiagnosticKind::TraitDecision => write!(f, "trait-decision"),
            DiagnosticKind::Patch => write!(f, "patch"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEvent {
    pub level: DiagnosticsLevel,
    pub kind: DiagnosticKind,
    pub module_id: Arc<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<u64>,
    pub payload: Value,
}

/// Per-module handle onto the runtime's diagnostics channel.
///
/// Payloads are built lazily, so a disabled level costs a single comparison.
#[derive(Debug, Clone)]
pub struct DiagnosticsSink {
    level: DiagnosticsLevel,
    module_id: Arc<str>,
    tx: broadcast::Sender<Arc<DiagnosticEvent>>,
}

impl DiagnosticsSink {
    pub fn new(
        level: DiagnosticsLevel,
        module_id: Arc<str>,
        tx: broadcast::Sender<Arc<DiagnosticEvent>>,
    ) -> Self {
        Self { level, module_id, tx }
    }

    /// A sink with its own channel, for code running outside a runtime.
    pub fn detached(level: DiagnosticsLevel, module_id: &str) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self::new(level, Arc::from(module_id), tx)
    }

    pub fn level(&self) -> DiagnosticsLevel {
        self.level
    }

    #[inline]
    pub fn enabled(&self, required: DiagnosticsLevel) -> bool {
        self.level != DiagnosticsLevel::Off && self.level >= required
    }

    /// Emits an event when `required` is enabled. `payload` is only called
    /// in that case.
    #[inline]
    pub fn emit<F>(&self, required: DiagnosticsLevel, kind: DiagnosticKind, txn_id: Option<u64>, payload: F)
    where
        F: FnOnce() -> Value,
    {
        if !self.enabled(required) {
            return;
        }
        let event = DiagnosticEvent {
            level: required,
            kind,
            module_id: self.module_id.clone(),
            txn_id,
            payload: payload(),
        };
        // No receivers is fine; diagnostics are best-effort.
        let _ = self.tx.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DiagnosticEvent>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_ordering_gates_events() {
        let sink = DiagnosticsSink::detached(DiagnosticsLevel::Light, "m");
        assert!(sink.enabled(DiagnosticsLevel::Light));
        assert!(!sink.enabled(DiagnosticsLevel::Full));
        assert!(!DiagnosticsSink::detached(DiagnosticsLevel::Off, "m").enabled(DiagnosticsLevel::Off));
    }

    #[test]
    fn test_payload_not_built_when_disabled() {
        let sink = DiagnosticsSink::detached(DiagnosticsLevel::Light, "m");
        let mut rx = sink.subscribe();
        sink.emit(DiagnosticsLevel::Full, DiagnosticKind::Patch, Some(1), || {
            panic!("payload built for a disabled level")
        });
        sink.emit(DiagnosticsLevel::Light, DiagnosticKind::TraitDecision, Some(2), || json!({"ok": true}));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, DiagnosticKind::TraitDecision);
        assert_eq!(event.txn_id, Some(2));
        assert_eq!(&*event.module_id, "m");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_kebab_kind() {
        let event = DiagnosticEvent {
            level: DiagnosticsLevel::Light,
            kind: DiagnosticKind::TxnLane,
            module_id: Arc::from("m"),
            txn_id: None,
            payload: json!({}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], json!("txn-lane"));
        assert_eq!(value["moduleId"], json!("m"));
    }
}
