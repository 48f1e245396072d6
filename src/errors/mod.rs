// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod graph;
mod handler;
mod module;
mod path;
mod transaction;

pub use config::ConfigError;
pub use graph::{GraphError, GraphErrors};
pub use handler::HandlerError;
pub(crate) use handler::panic_message;
pub use module::ModuleError;
pub use path::PathError;
pub use transaction::TransactionError;
