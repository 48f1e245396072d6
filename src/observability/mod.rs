// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability: structured log messages and the diagnostics event sink.
//!
//! Two separate channels, with different audiences:
//!
//! * `messages` - struct-based `tracing` messages for operators. Each type
//!   implements `Display` so wording lives in one place.
//! * `diagnostics` - a level-gated stream of [`DiagnosticEvent`]s with JSON
//!   payloads for tooling (`txn-lane`, `trait-decision`, `patch`). At level
//!   `off` emitting costs one comparison and never allocates.
//!
//! # Usage
//!
//! ```rust
//! use the_statewood::observability::messages::transaction::WriteRejected;
//! use the_statewood::observability::messages::StructuredLog;
//!
//! let msg = WriteRejected {
//!     module_id: "checkout",
//!     origin: "dispatch:submit",
//!     pending: 1024,
//! };
//!
//! msg.log();
//! ```

mod diagnostics;
pub mod messages;

pub use diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticsLevel, DiagnosticsSink};
