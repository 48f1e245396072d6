// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Single-writer transactions over a module's state tree.
//!
//! Each module owns one [`TransactionManager`]. At most one transaction is
//! open at a time (the writer lane); everything else waits in the backlog.
//! A transaction records patches into a draft, hands the draft to the
//! configured [`Converger`](crate::traits::Converger) on commit and then
//! publishes one snapshot and one [`CommitEvent`].
//!
//! Readers never see a draft: [`TransactionManager::snapshot`] always
//! returns the last committed state.

mod backlog;
mod handle;
mod manager;
mod origin;


pub use backlog::{BacklogSnapshot, LanePolicy};
pub use handle::TransactionHandle;
pub use manager::{CommitCallback, TransactionManager};
pub use origin::{OriginKind, TxnLane, TxnOrigin};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::ModuleSettings;
use crate::engine::{ConvergeBudget, ConvergeDecision, ConvergeMode, ExecutedMode};
use crate::observability::DiagnosticsLevel;
use crate::state::Patch;

/// Everything a [`TransactionManager`] needs from configuration.
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    pub converge_mode: ConvergeMode,
    pub budget: ConvergeBudget,
    pub lanes: LanePolicy,
    /// Backlog depth that triggers a pressure warning
    pub pressure_threshold: usize,
    pub pressure_cooldown: Duration,
    pub diagnostics_level: DiagnosticsLevel,
    /// Committed transactions kept for inspection at `full` diagnostics
    pub max_history: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        ModuleSettings::default().transaction_config(None)
    }
}

/// Published once per committed transaction that changed something.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    pub txn_id: u64,
    pub origin: TxnOrigin,
    pub state: Arc<Value>,
    pub patches: Arc<[Patch]>,
    /// Convergence stopped at its budget; some traits may be stale
    pub convergence_incomplete: bool,
    /// Write bodies folded into this transaction
    pub batch_size: usize,
}

/// History entry kept at diagnostics level `full`.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub txn_id: u64,
    pub origin: TxnOrigin,
    pub duration: Duration,
    pub patch_count: usize,
    pub executed: ExecutedMode,
    pub decision: Option<ConvergeDecision>,
    pub convergence_incomplete: bool,
}
