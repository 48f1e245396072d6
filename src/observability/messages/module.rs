// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for module instance lifecycle.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Module instance created in a runtime registry.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_statewood::observability::messages::module::ModuleInstantiated;
/// use the_statewood::observability::messages::StructuredLog;
///
/// let msg = ModuleInstantiated {
///     module_id: "checkout",
///     converge_mode: "auto",
///     config_scope: "runtime_module",
///     lanes_scope: "builtin",
/// };
///
/// msg.log();
/// ```
pub struct ModuleInstantiated<'a> {
    pub module_id: &'a str,
    pub converge_mode: &'a str,
    pub config_scope: &'a str,
    pub lanes_scope: &'a str,
}

impl Display for ModuleInstantiated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Module '{}' instantiated (converge mode {} from {})",
            self.module_id, self.converge_mode, self.config_scope
        )
    }
}

impl StructuredLog for ModuleInstantiated<'_> {
    fn log(&self) {
        tracing::info!(
            module_id = self.module_id,
            converge_mode = self.converge_mode,
            config_scope = self.config_scope,
            lanes_scope = self.lanes_scope,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "module",
            span_name = name,
            module_id = self.module_id,
            converge_mode = self.converge_mode,
        )
    }
}

/// Module released; its tasks are canceled and writes rejected.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ModuleReleased<'a> {
    pub module_id: &'a str,
    pub pending_refreshes: usize,
}

impl Display for ModuleReleased<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Module '{}' released", self.module_id)?;
        if self.pending_refreshes > 0 {
            write!(f, ", {} source load(s) canceled", self.pending_refreshes)?;
        }
        Ok(())
    }
}

impl StructuredLog for ModuleReleased<'_> {
    fn log(&self) {
        tracing::info!(
            module_id = self.module_id,
            pending_refreshes = self.pending_refreshes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("module", span_name = name, module_id = self.module_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_mentions_canceled_loads() {
        let quiet = ModuleReleased {
            module_id: "m",
            pending_refreshes: 0,
        };
        assert_eq!(quiet.to_string(), "Module 'm' released");

        let busy = ModuleReleased {
            module_id: "m",
            pending_refreshes: 2,
        };
        assert_eq!(busy.to_string(), "Module 'm' released, 2 source load(s) canceled");
    }
}
