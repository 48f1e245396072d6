// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::{HandlerError, TransactionError};
use crate::runtime::{Action, ModuleInstance};
use crate::transaction::{TransactionHandle, TxnOrigin};

/// What a handler invocation sees: its module, its cancellation token and
/// write helpers bound to both.
///
/// Every write goes through the module's transaction manager with the
/// invocation's token attached, so a canceled invocation never commits.
#[derive(Clone)]
pub struct TaskContext {
    module: ModuleInstance,
    runner: Arc<str>,
    invocation_id: u64,
    cancel: CancellationToken,
    /// Set by `latest` runners: id of the newest invocation
    current: Option<Arc<AtomicU64>>,
}

impl TaskContext {
    pub(crate) fn new(
        module: ModuleInstance,
        runner: Arc<str>,
        invocation_id: u64,
        cancel: CancellationToken,
        current: Option<Arc<AtomicU64>>,
    ) -> Self {
        Self {
            module,
            runner,
            invocation_id,
            cancel,
            current,
        }
    }

    /// A context outside any runner, e.g. for driving a handler by hand.
    pub fn detached(module: &ModuleInstance, name: &str) -> Self {
        let cancel = module.scope().child_token();
        Self::new(module.clone(), Arc::from(name), 0, cancel, None)
    }

    pub fn module(&self) -> &ModuleInstance {
        &self.module
    }

    pub fn runner(&self) -> &str {
        &self.runner
    }

    pub fn invocation_id(&self) -> u64 {
        self.invocation_id
    }

    /// Last committed state of the module.
    pub fn state(&self) -> Arc<Value> {
        self.module.snapshot()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// False once a newer occurrence has superseded this invocation.
    pub fn is_current(&self) -> bool {
        let newest = self
            .current
            .as_ref()
            .map_or(true, |current| current.load(Ordering::SeqCst) == self.invocation_id);
        newest && !self.is_cancelled()
    }

    fn ensure_live(&self) -> Result<(), HandlerError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(HandlerError::Canceled)
        }
    }

    /// Writes one field in its own transaction.
    pub async fn update(&self, path: &str, value: Value) -> Result<(), HandlerError> {
        let path = path.to_string();
        self.transaction(move |txn| {
            txn.update(&path, value)?;
            Ok(())
        })
        .await
    }

    /// Runs `body` in a transaction tagged with this runner's name.
    pub async fn transaction<F>(&self, body: F) -> Result<(), HandlerError>
    where
        F: FnOnce(&mut TransactionHandle) -> Result<(), HandlerError> + Send + 'static,
    {
        self.transaction_as(TxnOrigin::task_pending(&self.runner), body).await
    }

    pub async fn transaction_as<F>(&self, origin: TxnOrigin, body: F) -> Result<(), HandlerError>
    where
        F: FnOnce(&mut TransactionHandle) -> Result<(), HandlerError> + Send + 'static,
    {
        self.ensure_live()?;
        self.module.ensure_running()?;
        self.module
            .manager()
            .run(origin, Some(self.cancel.clone()), body)
            .await
    }

    /// Opens a transaction that stays open across awaits. Its commit aborts
    /// if this invocation is canceled first.
    pub async fn begin(&self) -> Result<TransactionHandle, HandlerError> {
        self.ensure_live()?;
        self.module.ensure_running()?;
        let handle = self
            .module
            .manager()
            .open_with(TxnOrigin::task_pending(&self.runner), self.cancel.clone())
            .await
            .map_err(|e| match e {
                TransactionError::Canceled => HandlerError::Canceled,
                other => HandlerError::from(other),
            })?;
        Ok(handle)
    }

    /// Sleeps unless canceled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), HandlerError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HandlerError::Canceled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    pub async fn dispatch(&self, action: Action) -> Result<(), HandlerError> {
        self.ensure_live()?;
        self.module.dispatch(action).await
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("module", &self.module.id())
            .field("runner", &self.runner)
            .field("invocation_id", &self.invocation_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
