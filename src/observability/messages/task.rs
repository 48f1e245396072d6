// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for task runners, invocations and source refreshes.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Task runner bound to a trigger stream.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_statewood::observability::messages::task::RunnerStarted;
///
/// let msg = RunnerStarted {
///     module_id: "search",
///     runner: "query",
///     policy: "latest",
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunnerStarted<'a> {
    pub module_id: &'a str,
    pub runner: &'a str,
    pub policy: &'a str,
}

impl Display for RunnerStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task runner '{}' started on module '{}' with {} policy",
            self.runner, self.module_id, self.policy
        )
    }
}

impl StructuredLog for RunnerStarted<'_> {
    fn log(&self) {
        tracing::info!(
            module_id = self.module_id,
            runner = self.runner,
            policy = self.policy,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "task_runner",
            span_name = name,
            module_id = self.module_id,
            runner = self.runner,
            policy = self.policy,
        )
    }
}

/// Task runner stopped after its stream ended or its scope was canceled.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RunnerStopped<'a> {
    pub module_id: &'a str,
    pub runner: &'a str,
    pub accepted: u64,
    pub dropped: u64,
    pub canceled: u64,
    pub failed: u64,
}

impl Display for RunnerStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task runner '{}' on module '{}' stopped: {} accepted, {} dropped, {} canceled, {} failed",
            self.runner, self.module_id, self.accepted, self.dropped, self.canceled, self.failed
        )
    }
}

impl StructuredLog for RunnerStopped<'_> {
    fn log(&self) {
        tracing::info!(
            module_id = self.module_id,
            runner = self.runner,
            accepted = self.accepted,
            dropped = self.dropped,
            canceled = self.canceled,
            failed = self.failed,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "task_runner",
            span_name = name,
            module_id = self.module_id,
            runner = self.runner,
        )
    }
}

/// Occurrence dropped by the `exhaust` policy.
///
/// # Log Level
/// `debug!` - Expected under load
pub struct OccurrenceDropped<'a> {
    pub module_id: &'a str,
    pub runner: &'a str,
}

impl Display for OccurrenceDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task runner '{}' on module '{}' dropped an occurrence while busy",
            self.runner, self.module_id
        )
    }
}

impl StructuredLog for OccurrenceDropped<'_> {
    fn log(&self) {
        tracing::debug!(module_id = self.module_id, runner = self.runner, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "task_runner",
            span_name = name,
            module_id = self.module_id,
            runner = self.runner,
        )
    }
}

/// Invocation canceled by its runner or module scope.
///
/// # Log Level
/// `debug!` - Cancellation is not an error
pub struct InvocationCanceled<'a> {
    pub module_id: &'a str,
    pub runner: &'a str,
    pub invocation_id: u64,
}

impl Display for InvocationCanceled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Invocation {} of task runner '{}' on module '{}' canceled",
            self.invocation_id, self.runner, self.module_id
        )
    }
}

impl StructuredLog for InvocationCanceled<'_> {
    fn log(&self) {
        tracing::debug!(
            module_id = self.module_id,
            runner = self.runner,
            invocation_id = self.invocation_id,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "invocation",
            span_name = name,
            module_id = self.module_id,
            runner = self.runner,
            invocation_id = self.invocation_id,
        )
    }
}

/// Handler returned an error or panicked. Reported to the module error hook.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct InvocationFailed<'a> {
    pub module_id: &'a str,
    pub runner: &'a str,
    pub invocation_id: u64,
    pub error: &'a dyn std::error::Error,
}

impl Display for InvocationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Invocation {} of task runner '{}' on module '{}' failed: {}",
            self.invocation_id, self.runner, self.module_id, self.error
        )
    }
}

impl StructuredLog for InvocationFailed<'_> {
    fn log(&self) {
        tracing::error!(
            module_id = self.module_id,
            runner = self.runner,
            invocation_id = self.invocation_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "invocation",
            span_name = name,
            module_id = self.module_id,
            runner = self.runner,
            invocation_id = self.invocation_id,
        )
    }
}

/// A source resource failed to load; the error is written to the snapshot.
///
/// # Log Level
/// `warn!` - Visible in state, worth noticing
pub struct SourceLoadFailed<'a> {
    pub module_id: &'a str,
    pub field_path: &'a str,
    pub error: &'a str,
}

impl Display for SourceLoadFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Source '{}' on module '{}' failed to load: {}",
            self.field_path, self.module_id, self.error
        )
    }
}

impl StructuredLog for SourceLoadFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            module_id = self.module_id,
            field_path = self.field_path,
            error = self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "source_refresh",
            span_name = name,
            module_id = self.module_id,
            field_path = self.field_path,
        )
    }
}

/// A source result arrived for a key that is no longer current; discarded.
///
/// # Log Level
/// `debug!` - Expected when keys change quickly
pub struct StaleSourceResult<'a> {
    pub module_id: &'a str,
    pub field_path: &'a str,
}

impl Display for StaleSourceResult<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Discarded stale result for source '{}' on module '{}'",
            self.field_path, self.module_id
        )
    }
}

impl StructuredLog for StaleSourceResult<'_> {
    fn log(&self) {
        tracing::debug!(
            module_id = self.module_id,
            field_path = self.field_path,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "source_refresh",
            span_name = name,
            module_id = self.module_id,
            field_path = self.field_path,
        )
    }
}
