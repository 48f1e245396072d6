// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Module instances and the runtime that owns them.
//!
//! A [`ModuleInstance`] moves through three phases:
//!
//! 1. `setup` - traits are declared, reducers and hooks registered
//! 2. `running` - entered by [`ModuleInstance::start`], which compiles the
//!    trait graph and converges the initial state once
//! 3. `released` - tasks and source loads canceled, writes rejected
//!
//! [`Runtime`] resolves per-module configuration and keeps the registry.

mod action;
mod module;
mod refresh;
mod registry;


pub use action::Action;
pub use module::{ErrorHook, ModuleInstance, ModulePhase, Reducer, Subscription};
pub use registry::{ModuleRegistry, Runtime};
