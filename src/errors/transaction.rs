// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::errors::PathError;

/// Failures surfaced by the transaction manager.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("write backlog for module '{module_id}' is full ({pending} pending)")]
    BacklogFull { module_id: String, pending: usize },

    #[error("transaction canceled before commit")]
    Canceled,

    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("convergence panicked in transaction {txn_id}: {message}")]
    ConvergencePanicked { txn_id: u64, message: String },

    #[error("transaction manager for module '{module_id}' is shut down")]
    ManagerClosed { module_id: String },
}
