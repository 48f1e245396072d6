// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runtime configuration: file loading, defaults and per-module resolution.

mod loader;
mod runtime;

#[cfg(test)]
mod integration_tests;
pub mod consts;

pub use loader::{
    from_toml_str, from_yaml_str, load_config, LaneOverride, ModuleOverride, RuntimeConfig,
    TxnLanesConfig,
};
pub use runtime::{ConfigScope, ModuleSettings};
