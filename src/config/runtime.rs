// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::consts::MAX_BUDGET_MS;
use crate::config::{LaneOverride, RuntimeConfig, TxnLanesConfig};
use crate::engine::{Clock, ConvergeBudget, ConvergeMode};
use crate::observability::DiagnosticsLevel;
use crate::transaction::{LanePolicy, TransactionConfig};

/// Which layer supplied the winning value of a setting group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    Builtin,
    RuntimeDefault,
    RuntimeModule,
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigScope::Builtin => write!(f, "builtin"),
            ConfigScope::RuntimeDefault => write!(f, "runtime_default"),
            ConfigScope::RuntimeModule => write!(f, "runtime_module"),
        }
    }
}

/// Effective settings for one module after applying
/// builtin < runtime default < module override.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSettings {
    pub converge_mode: ConvergeMode,
    pub converge_budget: Duration,
    pub decision_budget: Duration,
    pub diagnostics_level: DiagnosticsLevel,
    pub max_txn_history: usize,
    pub lanes_enabled: bool,
    pub lane_override: Option<LaneOverride>,
    pub allow_coalesce: bool,
    pub backlog_capacity: usize,
    pub pressure_threshold: usize,
    pub pressure_cooldown: Duration,
    /// Scope of the converge settings
    pub config_scope: ConfigScope,
    /// Scope of the lane settings
    pub lanes_scope: ConfigScope,
}

fn millis(ms: f64) -> Duration {
    Duration::from_secs_f64(ms / 1000.0)
}

/// Ignores values that cannot be a budget and caps the rest.
fn positive(ms: Option<f64>) -> Option<f64> {
    ms.filter(|ms| ms.is_finite() && *ms > 0.0)
        .map(|ms| ms.min(MAX_BUDGET_MS))
}

impl ModuleSettings {
    /// Resolves the settings for `module_id`.
    pub fn resolve(config: &RuntimeConfig, module_id: &str) -> Self {
        let mut settings = Self::builtin(config);
        settings.apply_runtime_default(config);
        if let Some(module) = config.module_overrides.get(module_id) {
            let mut changed = false;
            if let Some(mode) = module.trait_converge_mode {
                settings.converge_mode = mode;
                changed = true;
            }
            if let Some(ms) = positive(module.trait_converge_budget_ms) {
                settings.converge_budget = millis(ms);
                changed = true;
            }
            if let Some(ms) = positive(module.trait_converge_decision_budget_ms) {
                settings.decision_budget = millis(ms);
                changed = true;
            }
            if let Some(level) = module.diagnostics_level {
                settings.diagnostics_level = level;
                changed = true;
            }
            if changed {
                settings.config_scope = ConfigScope::RuntimeModule;
            }
            if let Some(lanes) = &module.txn_lanes {
                settings.apply_lanes(lanes, ConfigScope::RuntimeModule);
            }
        }
        settings
    }

    fn builtin(config: &RuntimeConfig) -> Self {
        let lanes = TxnLanesConfig::default();
        Self {
            converge_mode: ConvergeMode::default(),
            converge_budget: millis(RuntimeConfig::default().get_converge_budget_ms()),
            decision_budget: millis(RuntimeConfig::default().get_decision_budget_ms()),
            diagnostics_level: DiagnosticsLevel::default(),
            max_txn_history: config.get_max_txn_history(),
            lanes_enabled: lanes.get_enabled(),
            lane_override: None,
            allow_coalesce: lanes.get_allow_coalesce(),
            backlog_capacity: lanes.get_backlog_capacity(),
            pressure_threshold: lanes.get_pressure_threshold(),
            pressure_cooldown: Duration::from_millis(lanes.get_pressure_cooldown_ms()),
            config_scope: ConfigScope::Builtin,
            lanes_scope: ConfigScope::Builtin,
        }
    }

    fn apply_runtime_default(&mut self, config: &RuntimeConfig) {
        let mut changed = false;
        if let Some(mode) = config.trait_converge_mode {
            self.converge_mode = mode;
            changed = true;
        }
        if let Some(ms) = positive(config.trait_converge_budget_ms) {
            self.converge_budget = millis(ms);
            changed = true;
        }
        if let Some(ms) = positive(config.trait_converge_decision_budget_ms) {
            self.decision_budget = millis(ms);
            changed = true;
        }
        if let Some(level) = config.diagnostics_level {
            self.diagnostics_level = level;
            changed = true;
        }
        if changed {
            self.config_scope = ConfigScope::RuntimeDefault;
        }
        self.apply_lanes(&config.txn_lanes, ConfigScope::RuntimeDefault);
    }

    fn apply_lanes(&mut self, lanes: &TxnLanesConfig, scope: ConfigScope) {
        if !lanes.is_set() {
            return;
        }
        if let Some(enabled) = lanes.enabled {
            self.lanes_enabled = enabled;
        }
        if let Some(mode) = lanes.override_mode {
            self.lane_override = Some(mode);
        }
        if let Some(allow) = lanes.allow_coalesce {
            self.allow_coalesce = allow;
        }
        if let Some(capacity) = lanes.backlog_capacity.filter(|c| *c > 0) {
            self.backlog_capacity = capacity;
        }
        if let Some(threshold) = lanes.pressure_threshold {
            self.pressure_threshold = threshold;
        }
        if let Some(ms) = lanes.pressure_cooldown_ms {
            self.pressure_cooldown = Duration::from_millis(ms);
        }
        self.lanes_scope = scope;
    }

    /// Backlog discipline after overrides: `forced_off` or disabled lanes
    /// give one FIFO queue, `forced_sync` also turns coalescing off.
    pub fn lane_policy(&self) -> LanePolicy {
        let (dual_lanes, allow_coalesce) = match self.lane_override {
            Some(LaneOverride::ForcedSync) => (false, false),
            Some(LaneOverride::ForcedOff) => (false, self.allow_coalesce),
            None => (self.lanes_enabled, self.allow_coalesce),
        };
        LanePolicy {
            dual_lanes,
            allow_coalesce,
            capacity: self.backlog_capacity,
        }
    }

    pub fn transaction_config(&self, clock: Option<Arc<dyn Clock>>) -> TransactionConfig {
        let mut budget = ConvergeBudget::new(self.converge_budget, self.decision_budget);
        if let Some(clock) = clock {
            budget = budget.with_clock(clock);
        }
        TransactionConfig {
            converge_mode: self.converge_mode,
            budget,
            lanes: self.lane_policy(),
            pressure_threshold: self.pressure_threshold,
            pressure_cooldown: self.pressure_cooldown,
            diagnostics_level: self.diagnostics_level,
            max_history: self.max_txn_history,
        }
    }
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self::resolve(&RuntimeConfig::default(), "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleOverride;

    #[test]
    fn test_builtin_scope_when_unconfigured() {
        let settings = ModuleSettings::default();
        assert_eq!(settings.config_scope, ConfigScope::Builtin);
        assert_eq!(settings.lanes_scope, ConfigScope::Builtin);
        assert_eq!(settings.converge_mode, ConvergeMode::Auto);
        assert_eq!(settings.converge_budget, Duration::from_millis(200));
        assert_eq!(settings.decision_budget, Duration::from_micros(500));
    }

    #[test]
    fn test_module_override_wins() {
        let mut config = RuntimeConfig {
            trait_converge_mode: Some(ConvergeMode::Full),
            ..RuntimeConfig::default()
        };
        config.module_overrides.insert(
            "search".to_string(),
            ModuleOverride {
                trait_converge_mode: Some(ConvergeMode::Dirty),
                ..ModuleOverride::default()
            },
        );

        let search = ModuleSettings::resolve(&config, "search");
        assert_eq!(search.converge_mode, ConvergeMode::Dirty);
        assert_eq!(search.config_scope, ConfigScope::RuntimeModule);

        let other = ModuleSettings::resolve(&config, "cart");
        assert_eq!(other.converge_mode, ConvergeMode::Full);
        assert_eq!(other.config_scope, ConfigScope::RuntimeDefault);
    }

    #[test]
    fn test_non_positive_budget_is_ignored() {
        let config = RuntimeConfig {
            trait_converge_budget_ms: Some(-1.0),
            ..RuntimeConfig::default()
        };
        let settings = ModuleSettings::resolve(&config, "m");
        assert_eq!(settings.converge_budget, Duration::from_millis(200));
        assert_eq!(settings.config_scope, ConfigScope::Builtin);
    }

    #[test]
    fn test_oversized_budget_is_capped() {
        let config = RuntimeConfig {
            trait_converge_budget_ms: Some(1e30),
            trait_converge_decision_budget_ms: Some(f64::MAX),
            ..RuntimeConfig::default()
        };
        let settings = ModuleSettings::resolve(&config, "m");
        assert_eq!(settings.converge_budget, Duration::from_secs(60));
        assert_eq!(settings.decision_budget, Duration::from_secs(60));
    }

    #[test]
    fn test_lane_overrides() {
        let mut settings = ModuleSettings::default();
        assert!(settings.lane_policy().dual_lanes);
        assert!(settings.lane_policy().allow_coalesce);

        settings.lane_override = Some(LaneOverride::ForcedOff);
        assert!(!settings.lane_policy().dual_lanes);
        assert!(settings.lane_policy().allow_coalesce);

        settings.lane_override = Some(LaneOverride::ForcedSync);
        assert!(!settings.lane_policy().allow_coalesce);
    }

    #[test]
    fn test_lane_scope_tracks_module_patch() {
        let mut config = RuntimeConfig::default();
        config.module_overrides.insert(
            "grid".to_string(),
            ModuleOverride {
                txn_lanes: Some(TxnLanesConfig {
                    override_mode: Some(LaneOverride::ForcedSync),
                    ..TxnLanesConfig::default()
                }),
                ..ModuleOverride::default()
            },
        );
        let settings = ModuleSettings::resolve(&config, "grid");
        assert_eq!(settings.lanes_scope, ConfigScope::RuntimeModule);
        assert_eq!(settings.config_scope, ConfigScope::Builtin);
        assert_eq!(settings.lane_override, Some(LaneOverride::ForcedSync));
    }
}
