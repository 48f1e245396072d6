// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Messages are organized by subsystem:
//!
//! * `graph` - trait graph compilation
//! * `module` - module instantiation and release
//! * `transaction` - writer lane, backlog and commit events
//! * `converge` - convergence outcomes and budget overruns
//! * `task` - task runner, invocation and source refresh events

use tracing::Span;

pub mod converge;
pub mod graph;
pub mod module;
pub mod task;
pub mod transaction;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog {
    /// Emit the message at its level with structured fields.
    fn log(&self);

    /// A span carrying the same fields.
    fn span(&self, name: &str) -> Span;
}
