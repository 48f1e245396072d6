// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;     // runtime config + per-module resolution
pub mod engine;     // convergence strategies
pub mod errors;     // error handling
pub mod graph;      // field paths + trait graph compiler
pub mod observability;
pub mod runtime;    // module instances and their registry
pub mod state;      // drafts, patches, dirty sets
pub mod task;       // trigger streams + concurrency policies
pub mod traits;     // unified abstractions
pub mod transaction; // single-writer lane
