// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the writer lane, backlog and commits.
//!
//! This module contains message types for logging events related to:
//! * Write requests queued, coalesced or rejected behind the writer lane
//! * Backlog pressure
//! * Transaction commit and abort

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Write request queued behind the held writer lane.
///
/// # Log Level
/// `debug!` - Routine contention
pub struct WriteQueued<'a> {
    pub module_id: &'a str,
    pub origin: &'a str,
    pub pending: usize,
}

impl Display for WriteQueued<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Write from '{}' queued on module '{}' ({} pending)",
            self.origin, self.module_id, self.pending
        )
    }
}

impl StructuredLog for WriteQueued<'_> {
    fn log(&self) {
        tracing::debug!(
            module_id = self.module_id,
            origin = self.origin,
            pending = self.pending,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "txn_lane",
            span_name = name,
            module_id = self.module_id,
            origin = self.origin,
        )
    }
}

/// Write request merged into a pending request from the same origin.
///
/// # Log Level
/// `debug!` - Routine contention
pub struct WriteCoalesced<'a> {
    pub module_id: &'a str,
    pub origin: &'a str,
    pub batch_size: usize,
}

impl Display for WriteCoalesced<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Write from '{}' coalesced on module '{}' (batch of {})",
            self.origin, self.module_id, self.batch_size
        )
    }
}

impl StructuredLog for WriteCoalesced<'_> {
    fn log(&self) {
        tracing::debug!(
            module_id = self.module_id,
            origin = self.origin,
            batch_size = self.batch_size,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "txn_lane",
            span_name = name,
            module_id = self.module_id,
            origin = self.origin,
        )
    }
}

/// Write request rejected because the backlog is at capacity.
///
/// # Log Level
/// `warn!` - Backpressure visible to callers
///
/// # Example
/// ```
/// use the_statewood::observability::messages::transaction::WriteRejected;
///
/// let msg = WriteRejected {
///     module_id: "search",
///     origin: "task:query",
///     pending: 4096,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct WriteRejected<'a> {
    pub module_id: &'a str,
    pub origin: &'a str,
    pub pending: usize,
}

impl Display for WriteRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Write from '{}' rejected on module '{}': backlog full ({} pending)",
            self.origin, self.module_id, self.pending
        )
    }
}

impl StructuredLog for WriteRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            module_id = self.module_id,
            origin = self.origin,
            pending = self.pending,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "txn_lane",
            span_name = name,
            module_id = self.module_id,
            origin = self.origin,
        )
    }
}

/// Backlog depth crossed the pressure threshold. Rate limited by a cooldown.
///
/// # Log Level
/// `warn!` - Sustained contention
pub struct BacklogPressure<'a> {
    pub module_id: &'a str,
    pub pending: usize,
    pub threshold: usize,
    pub oldest_age: Duration,
}

impl Display for BacklogPressure<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Write backlog on module '{}' at {} (threshold {}), oldest waiting {:?}",
            self.module_id, self.pending, self.threshold, self.oldest_age
        )
    }
}

impl StructuredLog for BacklogPressure<'_> {
    fn log(&self) {
        tracing::warn!(
            module_id = self.module_id,
            pending = self.pending,
            threshold = self.threshold,
            oldest_age_ms = self.oldest_age.as_secs_f64() * 1000.0,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "txn_lane",
            span_name = name,
            module_id = self.module_id,
            pending = self.pending,
        )
    }
}

/// Transaction committed and published.
///
/// # Log Level
/// `debug!` - High-volume event
pub struct TransactionCommitted<'a> {
    pub module_id: &'a str,
    pub txn_id: u64,
    pub origin: &'a str,
    pub patch_count: usize,
    pub duration: Duration,
}

impl Display for TransactionCommitted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Transaction {} on module '{}' from '{}' committed {} patch(es) in {:?}",
            self.txn_id, self.module_id, self.origin, self.patch_count, self.duration
        )
    }
}

impl StructuredLog for TransactionCommitted<'_> {
    fn log(&self) {
        tracing::debug!(
            module_id = self.module_id,
            txn_id = self.txn_id,
            origin = self.origin,
            patch_count = self.patch_count,
            duration_ms = self.duration.as_secs_f64() * 1000.0,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "transaction",
            span_name = name,
            module_id = self.module_id,
            txn_id = self.txn_id,
            origin = self.origin,
        )
    }
}

/// Transaction aborted; draft discarded.
///
/// # Log Level
/// `debug!` - Cancellation is routine, failures are logged by the caller
pub struct TransactionAborted<'a> {
    pub module_id: &'a str,
    pub txn_id: u64,
    pub origin: &'a str,
    pub cause: &'a str,
    pub discarded_patches: usize,
}

impl Display for TransactionAborted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Transaction {} on module '{}' from '{}' aborted ({}), {} patch(es) discarded",
            self.txn_id, self.module_id, self.origin, self.cause, self.discarded_patches
        )
    }
}

impl StructuredLog for TransactionAborted<'_> {
    fn log(&self) {
        tracing::debug!(
            module_id = self.module_id,
            txn_id = self.txn_id,
            origin = self.origin,
            cause = self.cause,
            discarded_patches = self.discarded_patches,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "transaction",
            span_name = name,
            module_id = self.module_id,
            txn_id = self.txn_id,
        )
    }
}
