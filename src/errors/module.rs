// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::errors::{GraphErrors, TransactionError};

/// Module lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModuleError {
    #[error("trait graph for module '{module_id}' failed to compile: {errors}")]
    Structural {
        module_id: String,
        errors: GraphErrors,
    },

    #[error("module '{module_id}' is already running; traits can only be declared during setup")]
    AlreadyRunning { module_id: String },

    #[error("module '{module_id}' is not running")]
    NotRunning { module_id: String },

    #[error("module '{module_id}' has been released")]
    Released { module_id: String },

    #[error("module '{module_id}' cannot use the runtime config: {reason}")]
    InvalidConfig { module_id: String, reason: String },

    #[error("module '{module_id}' is already registered")]
    DuplicateModule { module_id: String },

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}
