// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Task concurrency runner.
//!
//! A [`TaskRunner`] pulls occurrences from a [`TriggerStream`] and starts
//! handler invocations according to its [`TaskPolicy`]:
//!
//! | policy | new occurrence while one is in flight |
//! |---|---|
//! | `task` | independent detached invocation |
//! | `parallel` | spawned into the runner's group; the group is awaited on stop |
//! | `latest` | in-flight invocation canceled, new one started |
//! | `exhaust` | occurrence dropped |
//!
//! Handlers write through their [`TaskContext`]; a canceled invocation
//! never leaves a committed transaction behind.

mod context;
mod lifecycle;
mod policy;
mod runner;
mod trigger;

#[cfg(test)]
mod integration_tests;

pub use context::TaskContext;
pub use lifecycle::TaskLifecycle;
pub use policy::TaskPolicy;
pub use runner::{RunnerHandle, RunnerSnapshot, RunnerStats, TaskRunner};
pub use trigger::TriggerStream;
