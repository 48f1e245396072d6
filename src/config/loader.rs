// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_BACKLOG_CAPACITY, DEFAULT_CONVERGE_BUDGET_MS, DEFAULT_DECISION_BUDGET_MS,
    DEFAULT_MAX_TXN_HISTORY, DEFAULT_PRESSURE_COOLDOWN_MS, DEFAULT_PRESSURE_THRESHOLD,
    MAX_BUDGET_MS,
};
use crate::engine::ConvergeMode;
use crate::errors::ConfigError;
use crate::observability::DiagnosticsLevel;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Runtime-wide configuration.
///
/// Every field is optional; anything left out falls back to the built-in
/// defaults in [`consts`](crate::config::consts). Keys may be written in
/// `snake_case` or `camelCase`.
///
/// # Example
/// ```yaml
/// trait_converge_mode: auto
/// trait_converge_budget_ms: 200
/// trait_converge_decision_budget_ms: 0.5
/// diagnostics_level: light
/// txn_lanes:
///   enabled: true
///   allow_coalesce: true
///   backlog_capacity: 1024
/// module_overrides:
///   search:
///     trait_converge_mode: dirty
///     txn_lanes:
///       override_mode: forced_sync
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(alias = "traitConvergeMode")]
    pub trait_converge_mode: Option<ConvergeMode>,
    #[serde(alias = "traitConvergeBudgetMs")]
    pub trait_converge_budget_ms: Option<f64>,
    #[serde(alias = "traitConvergeDecisionBudgetMs")]
    pub trait_converge_decision_budget_ms: Option<f64>,
    #[serde(alias = "diagnosticsLevel")]
    pub diagnostics_level: Option<DiagnosticsLevel>,
    #[serde(alias = "maxTxnHistory")]
    pub max_txn_history: Option<usize>,
    #[serde(default, alias = "txnLanes")]
    pub txn_lanes: TxnLanesConfig,
    #[serde(default, alias = "moduleOverrides")]
    pub module_overrides: HashMap<String, ModuleOverride>,
}

impl RuntimeConfig {
    pub fn get_converge_mode(&self) -> ConvergeMode {
        self.trait_converge_mode.unwrap_or_default()
    }

    pub fn get_converge_budget_ms(&self) -> f64 {
        self.trait_converge_budget_ms.unwrap_or(DEFAULT_CONVERGE_BUDGET_MS)
    }

    pub fn get_decision_budget_ms(&self) -> f64 {
        self.trait_converge_decision_budget_ms
            .unwrap_or(DEFAULT_DECISION_BUDGET_MS)
    }

    pub fn get_diagnostics_level(&self) -> DiagnosticsLevel {
        self.diagnostics_level.unwrap_or_default()
    }

    pub fn get_max_txn_history(&self) -> usize {
        self.max_txn_history.unwrap_or(DEFAULT_MAX_TXN_HISTORY)
    }

    /// Checks every configured value, including module overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_budget("trait_converge_budget_ms", self.trait_converge_budget_ms)?;
        validate_budget(
            "trait_converge_decision_budget_ms",
            self.trait_converge_decision_budget_ms,
        )?;
        self.txn_lanes.validate()?;
        for module in self.module_overrides.values() {
            validate_budget("trait_converge_budget_ms", module.trait_converge_budget_ms)?;
            validate_budget(
                "trait_converge_decision_budget_ms",
                module.trait_converge_decision_budget_ms,
            )?;
            if let Some(lanes) = &module.txn_lanes {
                lanes.validate()?;
            }
        }
        Ok(())
    }
}

fn validate_budget(field: &'static str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(ms) if !ms.is_finite() || ms <= 0.0 || ms > MAX_BUDGET_MS => Err(ConfigError::Invalid {
            field,
            reason: format!("{} must be a positive number of milliseconds up to {}", ms, MAX_BUDGET_MS),
        }),
        _ => Ok(()),
    }
}

/// Forces the writer lane into a simpler queueing discipline.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LaneOverride {
    /// One FIFO queue, no urgency lanes
    ForcedOff,
    /// One FIFO queue and no coalescing: every request commits on its own
    ForcedSync,
}

/// Writer-lane and backlog settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TxnLanesConfig {
    pub enabled: Option<bool>,
    #[serde(alias = "overrideMode")]
    pub override_mode: Option<LaneOverride>,
    #[serde(alias = "backlogCapacity")]
    pub backlog_capacity: Option<usize>,
    #[serde(alias = "allowCoalesce")]
    pub allow_coalesce: Option<bool>,
    #[serde(alias = "pressureThreshold")]
    pub pressure_threshold: Option<usize>,
    #[serde(alias = "pressureCooldownMs")]
    pub pressure_cooldown_ms: Option<u64>,
}

impl TxnLanesConfig {
    pub fn get_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn get_backlog_capacity(&self) -> usize {
        self.backlog_capacity.unwrap_or(DEFAULT_BACKLOG_CAPACITY)
    }

    pub fn get_allow_coalesce(&self) -> bool {
        self.allow_coalesce.unwrap_or(true)
    }

    pub fn get_pressure_threshold(&self) -> usize {
        self.pressure_threshold.unwrap_or(DEFAULT_PRESSURE_THRESHOLD)
    }

    pub fn get_pressure_cooldown_ms(&self) -> u64 {
        self.pressure_cooldown_ms.unwrap_or(DEFAULT_PRESSURE_COOLDOWN_MS)
    }

    /// True when this patch sets anything.
    pub fn is_set(&self) -> bool {
        self != &TxnLanesConfig::default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog_capacity == Some(0) {
            return Err(ConfigError::Invalid {
                field: "txn_lanes.backlog_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-module patch over [`RuntimeConfig`]. Set fields win.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ModuleOverride {
    #[serde(alias = "traitConvergeMode")]
    pub trait_converge_mode: Option<ConvergeMode>,
    #[serde(alias = "traitConvergeBudgetMs")]
    pub trait_converge_budget_ms: Option<f64>,
    #[serde(alias = "traitConvergeDecisionBudgetMs")]
    pub trait_converge_decision_budget_ms: Option<f64>,
    #[serde(alias = "diagnosticsLevel")]
    pub diagnostics_level: Option<DiagnosticsLevel>,
    #[serde(alias = "txnLanes")]
    pub txn_lanes: Option<TxnLanesConfig>,
}

/// Load a runtime config from a YAML (`.yaml`, `.yml`) or TOML (`.toml`) file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let cfg = match extension.as_deref() {
        Some("yaml") | Some("yml") => from_yaml_str(&content)?,
        Some("toml") => from_toml_str(&content)?,
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };
    Ok(cfg)
}

pub fn from_yaml_str(content: &str) -> Result<RuntimeConfig, ConfigError> {
    let cfg: RuntimeConfig = serde_yaml::from_str(content)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn from_toml_str(content: &str) -> Result<RuntimeConfig, ConfigError> {
    let cfg: RuntimeConfig = toml::from_str(content)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_yaml() {
        let yaml = r#"
trait_converge_mode: dirty
trait_converge_budget_ms: 50
diagnostics_level: full
txn_lanes:
  override_mode: forced_off
  backlog_capacity: 16
"#;

        let cfg = from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.get_converge_mode(), ConvergeMode::Dirty);
        assert_eq!(cfg.get_converge_budget_ms(), 50.0);
        assert_eq!(cfg.get_decision_budget_ms(), DEFAULT_DECISION_BUDGET_MS);
        assert_eq!(cfg.get_diagnostics_level(), DiagnosticsLevel::Full);
        assert_eq!(cfg.txn_lanes.override_mode, Some(LaneOverride::ForcedOff));
        assert_eq!(cfg.txn_lanes.get_backlog_capacity(), 16);
    }

    #[test]
    fn parse_camel_case_aliases() {
        let yaml = r#"
traitConvergeMode: full
traitConvergeDecisionBudgetMs: 2
txnLanes:
  allowCoalesce: false
"#;

        let cfg = from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.get_converge_mode(), ConvergeMode::Full);
        assert_eq!(cfg.get_decision_budget_ms(), 2.0);
        assert!(!cfg.txn_lanes.get_allow_coalesce());
    }

    #[test]
    fn parse_toml_with_module_override() {
        let toml = r#"
trait_converge_mode = "auto"

[txn_lanes]
enabled = false

[module_overrides.search]
trait_converge_mode = "dirty"
"#;

        let cfg = from_toml_str(toml).unwrap();
        assert!(!cfg.txn_lanes.get_enabled());
        assert_eq!(
            cfg.module_overrides["search"].trait_converge_mode,
            Some(ConvergeMode::Dirty)
        );
    }

    #[test]
    fn defaults_when_empty() {
        let cfg = from_yaml_str("{}").unwrap();
        assert_eq!(cfg.get_converge_mode(), ConvergeMode::Auto);
        assert_eq!(cfg.get_converge_budget_ms(), DEFAULT_CONVERGE_BUDGET_MS);
        assert_eq!(cfg.get_diagnostics_level(), DiagnosticsLevel::Off);
        assert!(cfg.txn_lanes.get_enabled());
        assert!(!cfg.txn_lanes.is_set());
    }

    #[test]
    fn rejects_non_positive_budget() {
        let err = from_yaml_str("trait_converge_budget_ms: 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "trait_converge_budget_ms",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_capacity_in_override() {
        let yaml = r#"
module_overrides:
  grid:
    txn_lanes:
      backlog_capacity: 0
"#;
        assert!(from_yaml_str(yaml).is_err());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(matches!(
            from_yaml_str("trait_converge_mode: sometimes"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
