// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for convergence outcomes.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Convergence finished for a transaction.
///
/// # Log Level
/// `trace!` - Per-commit detail
pub struct ConvergeCompleted<'a> {
    pub module_id: &'a str,
    pub txn_id: u64,
    pub mode: &'a str,
    pub evaluated: usize,
    pub total: usize,
    pub duration: Duration,
}

impl Display for ConvergeCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Converged transaction {} on module '{}' in {} mode: {}/{} traits evaluated in {:?}",
            self.txn_id, self.module_id, self.mode, self.evaluated, self.total, self.duration
        )
    }
}

impl StructuredLog for ConvergeCompleted<'_> {
    fn log(&self) {
        tracing::trace!(
            module_id = self.module_id,
            txn_id = self.txn_id,
            mode = self.mode,
            evaluated = self.evaluated,
            total = self.total,
            duration_ms = self.duration.as_secs_f64() * 1000.0,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "converge",
            span_name = name,
            module_id = self.module_id,
            txn_id = self.txn_id,
            mode = self.mode,
        )
    }
}

/// Convergence budget ran out; the commit carries `convergence_incomplete`.
///
/// # Log Level
/// `warn!` - Degraded but non-fatal
///
/// # Example
/// ```
/// use std::time::Duration;
/// use the_statewood::observability::messages::converge::ConvergenceIncomplete;
///
/// let msg = ConvergenceIncomplete {
///     module_id: "grid",
///     txn_id: 42,
///     evaluated: 310,
///     skipped: 690,
///     budget: Duration::from_millis(200),
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct ConvergenceIncomplete<'a> {
    pub module_id: &'a str,
    pub txn_id: u64,
    pub evaluated: usize,
    pub skipped: usize,
    pub budget: Duration,
}

impl Display for ConvergenceIncomplete<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "convergence_incomplete: transaction {} on module '{}' hit its {:?} budget after {} traits, {} left stale",
            self.txn_id, self.module_id, self.budget, self.evaluated, self.skipped
        )
    }
}

impl StructuredLog for ConvergenceIncomplete<'_> {
    fn log(&self) {
        tracing::warn!(
            module_id = self.module_id,
            txn_id = self.txn_id,
            evaluated = self.evaluated,
            skipped = self.skipped,
            budget_ms = self.budget.as_secs_f64() * 1000.0,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "converge",
            span_name = name,
            module_id = self.module_id,
            txn_id = self.txn_id,
        )
    }
}

/// A trait evaluator panicked; the transaction was aborted.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ConvergencePanicked<'a> {
    pub module_id: &'a str,
    pub txn_id: u64,
    pub message: &'a str,
}

impl Display for ConvergencePanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Trait evaluation panicked in transaction {} on module '{}': {}",
            self.txn_id, self.module_id, self.message
        )
    }
}

impl StructuredLog for ConvergencePanicked<'_> {
    fn log(&self) {
        tracing::error!(
            module_id = self.module_id,
            txn_id = self.txn_id,
            message = self.message,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "converge",
            span_name = name,
            module_id = self.module_id,
            txn_id = self.txn_id,
        )
    }
}
