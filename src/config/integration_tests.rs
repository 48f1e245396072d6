// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::io::Write;
use std::time::Duration;

use tempfile::Builder;

use crate::config::{load_config, ConfigScope, LaneOverride, ModuleSettings};
use crate::engine::ConvergeMode;
use crate::errors::ConfigError;
use crate::observability::DiagnosticsLevel;

fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_yaml_and_resolve_module() {
    let file = write_temp(
        ".yaml",
        r#"
trait_converge_mode: auto
trait_converge_budget_ms: 100
diagnostics_level: light
module_overrides:
  checkout:
    trait_converge_budget_ms: 25
    txn_lanes:
      override_mode: forced_sync
"#,
    );

    let config = load_config(file.path()).unwrap();
    let checkout = ModuleSettings::resolve(&config, "checkout");
    assert_eq!(checkout.converge_budget, Duration::from_millis(25));
    assert_eq!(checkout.config_scope, ConfigScope::RuntimeModule);
    assert_eq!(checkout.diagnostics_level, DiagnosticsLevel::Light);
    assert_eq!(checkout.lane_override, Some(LaneOverride::ForcedSync));
    assert!(!checkout.lane_policy().allow_coalesce);

    let other = ModuleSettings::resolve(&config, "search");
    assert_eq!(other.converge_budget, Duration::from_millis(100));
    assert_eq!(other.config_scope, ConfigScope::RuntimeDefault);
    assert!(other.lane_policy().dual_lanes);
}

#[test]
fn test_load_toml() {
    let file = write_temp(
        ".toml",
        r#"
trait_converge_mode = "full"

[txn_lanes]
backlog_capacity = 8
"#,
    );

    let config = load_config(file.path()).unwrap();
    let settings = ModuleSettings::resolve(&config, "any");
    assert_eq!(settings.converge_mode, ConvergeMode::Full);
    assert_eq!(settings.lane_policy().capacity, 8);
    assert_eq!(settings.lanes_scope, ConfigScope::RuntimeDefault);
}

#[test]
fn test_unsupported_extension() {
    let file = write_temp(".json", "{}");
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    assert!(matches!(load_config(&missing), Err(ConfigError::Io { .. })));
}

#[test]
fn test_transaction_config_carries_budgets() {
    let file = write_temp(".yml", "trait_converge_decision_budget_ms: 3\n");
    let config = load_config(file.path()).unwrap();
    let txn = ModuleSettings::resolve(&config, "m").transaction_config(None);
    assert_eq!(txn.budget.decision, Duration::from_millis(3));
    assert_eq!(txn.budget.converge, Duration::from_millis(200));
    assert_eq!(txn.converge_mode, ConvergeMode::Auto);
}
