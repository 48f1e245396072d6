// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Convergence engine: brings trait nodes back in line with a transaction's
//! writes before it commits.
//!
//! Three interchangeable strategies implement [`Converger`]:
//!
//! * [`FullConverger`] evaluates every node in topological order
//! * [`DirtyConverger`] evaluates only the closure of the dirty roots, and
//!   only nodes whose deps are dirty when the sweep reaches them
//! * [`AutoConverger`] picks one of the two per transaction with a decision
//!   procedure bounded by its own budget
//!
//! All three stop at the converge budget, keep what was computed and flag the
//! report as incomplete.

mod auto;
mod clock;
mod dirty;
mod evaluate;
mod factory;
mod full;
mod source;


pub use auto::AutoConverger;
pub use clock::{Clock, SteppingClock, SystemClock};
pub use dirty::DirtyConverger;
pub use factory::ConvergerFactory;
pub use full::FullConverger;
pub use source::{SourceRefresh, SourceSnapshot, SourceStatus};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::evaluate::SweepStats;
use crate::graph::{FieldPath, TraitGraph, TraitKind, TraitNodeId};
use crate::state::Draft;

/// Requested convergence strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergeMode {
    Full,
    Dirty,
    #[default]
    Auto,
}

impl fmt::Display for ConvergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergeMode::Full => write!(f, "full"),
            ConvergeMode::Dirty => write!(f, "dirty"),
            ConvergeMode::Auto => write!(f, "auto"),
        }
    }
}

/// Strategy that actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutedMode {
    Full,
    Dirty,
}

impl fmt::Display for ExecutedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutedMode::Full => write!(f, "full"),
            ExecutedMode::Dirty => write!(f, "dirty"),
        }
    }
}

/// Why `auto` chose the strategy it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionReason {
    ColdStart,
    DirtyAll,
    NoDirtyRoots,
    EmptyGraph,
    NearFull,
    CacheHit,
    CacheMiss,
    DecisionBudgetExceeded,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecisionReason::ColdStart => "coldStart",
            DecisionReason::DirtyAll => "dirtyAll",
            DecisionReason::NoDirtyRoots => "noDirtyRoots",
            DecisionReason::EmptyGraph => "emptyGraph",
            DecisionReason::NearFull => "nearFull",
            DecisionReason::CacheHit => "cacheHit",
            DecisionReason::CacheMiss => "cacheMiss",
            DecisionReason::DecisionBudgetExceeded => "decisionBudgetExceeded",
        };
        f.write_str(name)
    }
}

/// Produced once per transaction in `auto` mode. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergeDecision {
    pub mode_used: ExecutedMode,
    pub decision_duration: Duration,
    /// The decision procedure ran out of budget
    pub cutoff: bool,
    pub reason: DecisionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergeOutcome {
    Converged,
    Noop,
    /// Budget ran out; computed values kept, remaining nodes stale
    Degraded,
}

/// A slow node, collected only at `full` diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub node_id: TraitNodeId,
    pub field_path: FieldPath,
    pub kind: TraitKind,
    pub duration: Duration,
}

/// Summary of one convergence pass.
#[derive(Debug, Clone)]
pub struct ConvergeReport {
    pub requested: ConvergeMode,
    pub executed: ExecutedMode,
    pub total_nodes: usize,
    /// Nodes the plan scheduled
    pub affected_nodes: usize,
    pub evaluated_nodes: usize,
    pub changed_nodes: usize,
    pub skipped_nodes: usize,
    /// Stopped at the converge budget
    pub incomplete: bool,
    pub duration: Duration,
    pub decision: Option<ConvergeDecision>,
    pub hotspots: Vec<Hotspot>,
    /// Source loads to start once the transaction commits
    pub refreshes: Vec<SourceRefresh>,
}

impl ConvergeReport {
    pub(crate) fn from_sweep(
        requested: ConvergeMode,
        executed: ExecutedMode,
        total_nodes: usize,
        stats: SweepStats,
    ) -> Self {
        Self {
            requested,
            executed,
            total_nodes,
            affected_nodes: stats.planned,
            evaluated_nodes: stats.evaluated,
            changed_nodes: stats.changed,
            skipped_nodes: stats.skipped,
            incomplete: stats.incomplete,
            duration: stats.duration,
            decision: None,
            hotspots: stats.hotspots,
            refreshes: stats.refreshes,
        }
    }

    pub fn outcome(&self) -> ConvergeOutcome {
        if self.incomplete {
            ConvergeOutcome::Degraded
        } else if self.changed_nodes == 0 {
            ConvergeOutcome::Noop
        } else {
            ConvergeOutcome::Converged
        }
    }

    /// Payload for `trait-decision` diagnostics events.
    pub fn to_diagnostic_payload(&self) -> Value {
        let mut payload = json!({
            "requestedMode": self.requested,
            "executedMode": self.executed,
            "outcome": self.outcome(),
            "durationMs": as_millis(self.duration),
            "stepStats": {
                "totalSteps": self.total_nodes,
                "affectedSteps": self.affected_nodes,
                "executedSteps": self.evaluated_nodes,
                "skippedSteps": self.skipped_nodes,
                "changedSteps": self.changed_nodes,
            },
        });
        if let Some(decision) = &self.decision {
            payload["decision"] = json!({
                "modeUsed": decision.mode_used,
                "decisionDurationMs": as_millis(decision.decision_duration),
                "cutoff": decision.cutoff,
                "reason": decision.reason,
            });
        }
        if !self.hotspots.is_empty() {
            payload["top3"] = self
                .hotspots
                .iter()
                .map(|h| {
                    json!({
                        "stepId": h.node_id,
                        "fieldPath": h.field_path,
                        "kind": h.kind,
                        "durationMs": as_millis(h.duration),
                    })
                })
                .collect();
        }
        payload
    }
}

pub(crate) fn as_millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Time limits for one convergence pass.
#[derive(Debug, Clone)]
pub struct ConvergeBudget {
    /// Whole recomputation pass
    pub converge: Duration,
    /// `auto` decision procedure
    pub decision: Duration,
    pub clock: Arc<dyn Clock>,
}

impl ConvergeBudget {
    pub fn new(converge: Duration, decision: Duration) -> Self {
        Self {
            converge,
            decision,
            clock: Arc::new(SystemClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Everything a converger needs for one transaction.
pub struct ConvergePass<'a> {
    pub graph: &'a TraitGraph,
    pub draft: &'a mut Draft,
    pub budget: &'a ConvergeBudget,
    /// 1-based sequence number of the transaction within its module
    pub txn_seq: u64,
    pub collect_hotspots: bool,
}
