// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for trait graph compilation.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Trait graph compiled and installed for a module.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_statewood::observability::messages::graph::TraitGraphCompiled;
///
/// let msg = TraitGraphCompiled {
///     module_id: "checkout",
///     node_count: 12,
///     edge_count: 9,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct TraitGraphCompiled<'a> {
    pub module_id: &'a str,
    pub node_count: usize,
    pub edge_count: usize,
}

impl Display for TraitGraphCompiled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Trait graph for module '{}' compiled: {} nodes, {} edges",
            self.module_id, self.node_count, self.edge_count
        )
    }
}

impl StructuredLog for TraitGraphCompiled<'_> {
    fn log(&self) {
        tracing::info!(
            module_id = self.module_id,
            node_count = self.node_count,
            edge_count = self.edge_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "trait_graph",
            span_name = name,
            module_id = self.module_id,
            node_count = self.node_count,
        )
    }
}

/// Trait declarations rejected; the module will not start.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct TraitGraphRejected<'a> {
    pub module_id: &'a str,
    pub error_count: usize,
    pub errors: &'a dyn std::error::Error,
}

impl Display for TraitGraphRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Trait graph for module '{}' rejected with {} error(s): {}",
            self.module_id, self.error_count, self.errors
        )
    }
}

impl StructuredLog for TraitGraphRejected<'_> {
    fn log(&self) {
        tracing::error!(
            module_id = self.module_id,
            error_count = self.error_count,
            errors = %self.errors,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "trait_graph",
            span_name = name,
            module_id = self.module_id,
            error_count = self.error_count,
        )
    }
}
