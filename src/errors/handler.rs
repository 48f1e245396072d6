// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;

use thiserror::Error;

use crate::errors::{ModuleError, TransactionError};

/// Errors produced by user handlers, reducers and write bodies.
///
/// `Other` wraps `anyhow::Error` so handler code can use `?` on anything.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("invocation canceled")]
    Canceled,

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    /// Converts a caught panic payload into `Panicked`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        HandlerError::Panicked(panic_message(payload))
    }

    /// Cancellation is not a failure and never reaches error hooks.
    pub fn is_canceled(&self) -> bool {
        matches!(
            self,
            HandlerError::Canceled | HandlerError::Transaction(TransactionError::Canceled)
        )
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payloads_become_messages() {
        let caught = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert!(matches!(HandlerError::from_panic(caught), HandlerError::Panicked(m) if m == "boom 7"));

        let caught = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(caught), "static");
    }

    #[test]
    fn test_cancellation_is_recognised_through_transactions() {
        assert!(HandlerError::Canceled.is_canceled());
        assert!(HandlerError::from(TransactionError::Canceled).is_canceled());
        assert!(!HandlerError::failed("nope").is_canceled());
    }
}
