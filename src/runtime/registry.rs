// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::{ModuleSettings, RuntimeConfig};
use crate::engine::Clock;
use crate::errors::ModuleError;
use crate::observability::messages::module::ModuleInstantiated;
use crate::observability::messages::StructuredLog;
use crate::observability::{DiagnosticEvent, DiagnosticsSink};
use crate::runtime::ModuleInstance;

const DIAGNOSTICS_CHANNEL_CAPACITY: usize = 1024;

/// Module instances by id.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, ModuleInstance>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, module: ModuleInstance) -> Result<(), ModuleError> {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        if modules.contains_key(module.id()) {
            return Err(ModuleError::DuplicateModule {
                module_id: module.id().to_string(),
            });
        }
        modules.insert(module.id().to_string(), module);
        Ok(())
    }

    pub fn get(&self, module_id: &str) -> Option<ModuleInstance> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module_id)
            .cloned()
    }

    pub fn remove(&self, module_id: &str) -> Option<ModuleInstance> {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(module_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns module instances and the configuration they resolve against.
///
/// There is no process-wide registry; every module lives in exactly one
/// `Runtime` and is released through it.
pub struct Runtime {
    config: RuntimeConfig,
    registry: ModuleRegistry,
    diagnostics: broadcast::Sender<Arc<DiagnosticEvent>>,
    clock: Option<Arc<dyn Clock>>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_CHANNEL_CAPACITY);
        Self {
            config,
            registry: ModuleRegistry::new(),
            diagnostics,
            clock: None,
        }
    }

    /// Replaces the clock used for convergence budgets.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn settings_for(&self, module_id: &str) -> ModuleSettings {
        ModuleSettings::resolve(&self.config, module_id)
    }

    /// Creates a module in its setup phase and registers it.
    ///
    /// The runtime config is validated first, since it may have been built
    /// in code rather than loaded.
    pub fn instantiate(&self, module_id: &str, initial_state: Value) -> Result<ModuleInstance, ModuleError> {
        self.config.validate().map_err(|e| ModuleError::InvalidConfig {
            module_id: module_id.to_string(),
            reason: e.to_string(),
        })?;
        if self.registry.get(module_id).is_some() {
            return Err(ModuleError::DuplicateModule {
                module_id: module_id.to_string(),
            });
        }

        let settings = self.settings_for(module_id);
        let sink = DiagnosticsSink::new(settings.diagnostics_level, Arc::from(module_id), self.diagnostics.clone());
        let module = ModuleInstance::new(
            module_id,
            initial_state,
            settings.transaction_config(self.clock.clone()),
            sink,
        );
        self.registry.insert(module.clone())?;

        ModuleInstantiated {
            module_id,
            converge_mode: &settings.converge_mode.to_string(),
            config_scope: &settings.config_scope.to_string(),
            lanes_scope: &settings.lanes_scope.to_string(),
        }
        .log();
        Ok(module)
    }

    pub fn get(&self, module_id: &str) -> Option<ModuleInstance> {
        self.registry.get(module_id)
    }

    /// Releases and unregisters a module. False if it was not registered.
    pub fn release(&self, module_id: &str) -> bool {
        match self.registry.remove(module_id) {
            Some(module) => {
                module.release();
                true
            }
            None => false,
        }
    }

    /// Releases every module.
    pub fn shutdown(&self) {
        for id in self.registry.ids() {
            self.release(&id);
        }
    }

    pub fn module_ids(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// Diagnostics events of every module in this runtime.
    pub fn diagnostics(&self) -> broadcast::Receiver<Arc<DiagnosticEvent>> {
        self.diagnostics.subscribe()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("modules", &self.registry.ids())
            .finish()
    }
}
