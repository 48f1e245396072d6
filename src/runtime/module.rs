// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::engine::ConvergeReport;
use crate::errors::{panic_message, HandlerError, ModuleError};
use crate::graph::{FieldPath, TraitGraph, TraitSpec};
use crate::observability::messages::graph::{TraitGraphCompiled, TraitGraphRejected};
use crate::observability::messages::module::ModuleReleased;
use crate::observability::messages::StructuredLog;
use crate::observability::DiagnosticsSink;
use crate::runtime::refresh::SourceRefresher;
use crate::runtime::Action;
use crate::state::get_at;
use crate::task::TriggerStream;
use crate::transaction::{
    CommitEvent, TransactionConfig, TransactionHandle, TransactionManager, TxnOrigin,
};

/// Reducer bound to an action tag. Runs inside the `dispatch` transaction.
pub type Reducer = Arc<dyn Fn(&mut TransactionHandle, &Value) -> Result<(), HandlerError> + Send + Sync>;

/// Receives handler failures: `(source, error)`, where `source` names the
/// runner or action that failed.
pub type ErrorHook = Arc<dyn Fn(&str, &HandlerError) + Send + Sync>;

const ACTION_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulePhase {
    /// Traits may be declared; writes are rejected
    Setup,
    Running,
    Released,
}

impl fmt::Display for ModulePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModulePhase::Setup => write!(f, "setup"),
            ModulePhase::Running => write!(f, "running"),
            ModulePhase::Released => write!(f, "released"),
        }
    }
}

struct ModuleInner {
    id: Arc<str>,
    manager: Arc<TransactionManager>,
    phase: Mutex<ModulePhase>,
    specs: Mutex<Vec<TraitSpec>>,
    reducers: RwLock<HashMap<String, Reducer>>,
    actions: broadcast::Sender<Action>,
    error_hooks: RwLock<Vec<ErrorHook>>,
    scope: CancellationToken,
    refresher: Arc<SourceRefresher>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One module instance: a state tree, its trait graph and everything bound
/// to it. Cheap to clone; clones share the instance.
///
/// ```rust
/// use serde_json::{json, Value};
/// use the_statewood::graph::TraitSpec;
/// use the_statewood::runtime::{Action, Runtime};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = Runtime::default();
/// let cart = runtime.instantiate("cart", json!({"qty": 1, "price": 3}))?;
/// cart.declare_traits([TraitSpec::computed("total", ["qty", "price"], |inputs| {
///     let qty = inputs.get("qty").and_then(Value::as_i64).unwrap_or(0);
///     let price = inputs.get("price").and_then(Value::as_i64).unwrap_or(0);
///     json!(qty * price)
/// })])?;
/// cart.reducer("set_qty", |txn, payload| {
///     txn.update("qty", payload.clone())?;
///     Ok(())
/// });
/// cart.start()?;
///
/// cart.dispatch(Action::new("set_qty", json!(4))).await?;
/// assert_eq!(cart.get("total"), Some(json!(12)));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ModuleInstance {
    inner: Arc<ModuleInner>,
}

impl ModuleInstance {
    pub fn new(module_id: &str, initial_state: Value, config: TransactionConfig, sink: DiagnosticsSink) -> Self {
        let id: Arc<str> = Arc::from(module_id);
        let manager = TransactionManager::new(module_id, initial_state, config, sink);
        let scope = CancellationToken::new();
        let refresher = SourceRefresher::new(id.clone(), &manager, scope.clone());
        let (actions, _) = broadcast::channel(ACTION_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(ModuleInner {
                id,
                manager,
                phase: Mutex::new(ModulePhase::Setup),
                specs: Mutex::new(Vec::new()),
                reducers: RwLock::new(HashMap::new()),
                actions,
                error_hooks: RwLock::new(Vec::new()),
                scope,
                refresher,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn phase(&self) -> ModulePhase {
        *lock(&self.inner.phase)
    }

    pub fn is_released(&self) -> bool {
        self.phase() == ModulePhase::Released
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.inner.manager
    }

    /// Parent token of every task and source load bound to this module.
    pub fn scope(&self) -> &CancellationToken {
        &self.inner.scope
    }

    /// Last committed state.
    pub fn snapshot(&self) -> Arc<Value> {
        self.inner.manager.snapshot()
    }

    /// Committed value at a dotted path.
    pub fn get(&self, path: &str) -> Option<Value> {
        let path = FieldPath::parse(path).ok()?;
        get_at(&self.snapshot(), &path).cloned()
    }

    /// Source loads still running.
    pub fn pending_refreshes(&self) -> usize {
        self.inner.refresher.pending()
    }

    /// Adds trait declarations. Only allowed during setup.
    pub fn declare_traits<I>(&self, specs: I) -> Result<(), ModuleError>
    where
        I: IntoIterator<Item = TraitSpec>,
    {
        let phase = lock(&self.inner.phase);
        match *phase {
            ModulePhase::Setup => {
                lock(&self.inner.specs).extend(specs);
                Ok(())
            }
            ModulePhase::Running => Err(ModuleError::AlreadyRunning {
                module_id: self.id().to_string(),
            }),
            ModulePhase::Released => Err(ModuleError::Released {
                module_id: self.id().to_string(),
            }),
        }
    }

    /// Compiles the declared traits, converges the initial state once and
    /// opens the module for writes. Subscribers are not notified of the
    /// initial convergence.
    pub fn start(&self) -> Result<ConvergeReport, ModuleError> {
        let mut phase = lock(&self.inner.phase);
        match *phase {
            ModulePhase::Setup => {}
            ModulePhase::Running => {
                return Err(ModuleError::AlreadyRunning {
                    module_id: self.id().to_string(),
                })
            }
            ModulePhase::Released => {
                return Err(ModuleError::Released {
                    module_id: self.id().to_string(),
                })
            }
        }

        let specs = lock(&self.inner.specs).clone();
        let graph = match TraitGraph::compile(specs) {
            Ok(graph) => graph,
            Err(errors) => {
                TraitGraphRejected {
                    module_id: self.id(),
                    error_count: errors.len(),
                    errors: &errors,
                }
                .log();
                return Err(ModuleError::Structural {
                    module_id: self.id().to_string(),
                    errors,
                });
            }
        };
        TraitGraphCompiled {
            module_id: self.id(),
            node_count: graph.len(),
            edge_count: graph.edge_count(),
        }
        .log();

        let refresher = self.inner.refresher.clone();
        self.inner
            .manager
            .set_refresh_hook(move |refreshes| refresher.schedule(refreshes));
        let report = self.inner.manager.install_graph(Arc::new(graph))?;
        *phase = ModulePhase::Running;
        Ok(report)
    }

    pub fn ensure_running(&self) -> Result<(), ModuleError> {
        match self.phase() {
            ModulePhase::Running => Ok(()),
            ModulePhase::Setup => Err(ModuleError::NotRunning {
                module_id: self.id().to_string(),
            }),
            ModulePhase::Released => Err(ModuleError::Released {
                module_id: self.id().to_string(),
            }),
        }
    }

    /// Opens a transaction, waiting for the writer lane.
    pub async fn transaction(&self, origin: TxnOrigin) -> Result<TransactionHandle, HandlerError> {
        self.ensure_running()?;
        Ok(self.inner.manager.open(origin).await?)
    }

    /// Runs `body` in a transaction and commits it.
    pub async fn run<F>(&self, origin: TxnOrigin, body: F) -> Result<(), HandlerError>
    where
        F: FnOnce(&mut TransactionHandle) -> Result<(), HandlerError> + Send + 'static,
    {
        self.ensure_running()?;
        self.inner.manager.run(origin, None, body).await
    }

    /// Registers the reducer for `tag`, replacing any previous one.
    pub fn reducer<F>(&self, tag: &str, reducer: F)
    where
        F: Fn(&mut TransactionHandle, &Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner
            .reducers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag.to_string(), Arc::new(reducer));
    }

    /// Runs the reducer for the action's tag (if any) in a `dispatch`
    /// transaction, then publishes the action to bound trigger streams.
    /// A failing reducer aborts its transaction and the action is not
    /// published.
    pub async fn dispatch(&self, action: Action) -> Result<(), HandlerError> {
        self.ensure_running()?;
        let reducer = self
            .inner
            .reducers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(action.tag())
            .cloned();

        if let Some(reducer) = reducer {
            let payload = action.payload.clone();
            let origin = TxnOrigin::dispatch(action.tag());
            let reduced = self
                .inner
                .manager
                .run(origin.clone(), None, move |txn| reducer(txn, &payload))
                .await;
            if let Err(e) = reduced {
                if !e.is_canceled() {
                    tracing::warn!(module_id = %self.inner.id, action = action.tag(), "reducer failed: {}", e);
                    self.report_error(&origin.to_string(), &e);
                }
                return Err(e);
            }
        }

        // No bound streams is fine.
        let _ = self.inner.actions.send(action);
        Ok(())
    }

    pub fn actions(&self) -> broadcast::Receiver<Action> {
        self.inner.actions.subscribe()
    }

    /// Payloads of dispatched actions with the given tag.
    pub fn on_action(&self, tag: &str) -> TriggerStream<Value> {
        let tag = tag.to_string();
        TriggerStream::from_broadcast(self.actions())
            .filter(move |action: &Action| action.tag() == tag)
            .map(|action| action.payload)
    }

    /// Selector-derived deltas of the committed state.
    pub fn watch<T, F>(&self, selector: F) -> TriggerStream<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&Value) -> T + Send + Sync + 'static,
    {
        TriggerStream::from_state(self.inner.manager.watch_state(), selector)
    }

    pub fn watch_state(&self) -> watch::Receiver<Arc<Value>> {
        self.inner.manager.watch_state()
    }

    pub fn commits(&self) -> broadcast::Receiver<Arc<CommitEvent>> {
        self.inner.manager.commits()
    }

    /// Commit events as a trigger stream.
    pub fn commit_stream(&self) -> TriggerStream<Arc<CommitEvent>> {
        TriggerStream::from_broadcast(self.commits())
    }

    /// Calls `on_commit` once per committed transaction, in commit order,
    /// until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, on_commit: F) -> Subscription
    where
        F: Fn(&CommitEvent) + Send + Sync + 'static,
    {
        let id = self.inner.manager.subscribe(Arc::new(on_commit));
        Subscription {
            manager: Arc::downgrade(&self.inner.manager),
            id,
            active: true,
        }
    }

    pub fn on_error<F>(&self, hook: F)
    where
        F: Fn(&str, &HandlerError) + Send + Sync + 'static,
    {
        self.inner
            .error_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// Delivers a handler failure to the error hooks. A panicking hook is
    /// logged and skipped.
    pub fn report_error(&self, source: &str, error: &HandlerError) {
        let hooks = self
            .inner
            .error_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if hooks.is_empty() {
            tracing::debug!(module_id = %self.inner.id, source, "no error hook installed");
            return;
        }
        for hook in hooks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| hook(source, error))) {
                tracing::error!(
                    module_id = %self.inner.id,
                    source,
                    "error hook panicked: {}",
                    panic_message(panic)
                );
            }
        }
    }

    /// Cancels every task and source load bound to the module and rejects
    /// further writes. Returns false if it was already released.
    pub fn release(&self) -> bool {
        {
            let mut phase = lock(&self.inner.phase);
            if *phase == ModulePhase::Released {
                return false;
            }
            *phase = ModulePhase::Released;
        }
        self.inner.scope.cancel();
        let pending_refreshes = self.inner.refresher.cancel_all();
        self.inner.manager.close();
        ModuleReleased {
            module_id: self.id(),
            pending_refreshes,
        }
        .log();
        true
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("id", &self.inner.id)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Keeps a commit callback registered. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    manager: Weak<TransactionManager>,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(mut self) -> bool {
        self.detach()
    }

    fn detach(&mut self) -> bool {
        if !std::mem::replace(&mut self.active, false) {
            return false;
        }
        self.manager
            .upgrade()
            .is_some_and(|manager| manager.unsubscribe(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
