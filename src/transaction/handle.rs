// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::TransactionError;
use crate::graph::FieldPath;
use crate::state::{Draft, Patch, PatchReason, Savepoint};
use crate::transaction::{TransactionManager, TxnOrigin};

/// An open transaction. Holds the module's writer lane until it is
/// committed, aborted or dropped.
///
/// Writes go to a private draft; nothing is visible to other readers until
/// [`commit`](Self::commit) converges the traits and publishes the result.
/// Dropping an uncommitted handle aborts it.
///
/// ```rust,no_run
/// # async fn demo(manager: std::sync::Arc<the_statewood::transaction::TransactionManager>)
/// #     -> Result<(), the_statewood::errors::TransactionError> {
/// use serde_json::json;
/// use the_statewood::transaction::TxnOrigin;
///
/// let mut txn = manager.open(TxnOrigin::custom("import")).await?;
/// txn.update("profile.name", json!("Ada"))?;
/// txn.update("profile.age", json!(36))?;
/// let state = txn.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct TransactionHandle {
    manager: Arc<TransactionManager>,
    id: u64,
    origin: TxnOrigin,
    reason: PatchReason,
    draft: Draft,
    cancel: Option<CancellationToken>,
    /// Lane is released when this handle finishes. False for handles driven
    /// by the backlog drain, which hands the lane on itself.
    owns_lane: bool,
    finished: bool,
    opened_at: Instant,
    batch_size: usize,
}

impl TransactionHandle {
    pub(crate) fn new(
        manager: Arc<TransactionManager>,
        id: u64,
        origin: TxnOrigin,
        base: Value,
        cancel: Option<CancellationToken>,
        owns_lane: bool,
    ) -> Self {
        let reason = origin.patch_reason();
        Self {
            manager,
            id,
            origin,
            reason,
            draft: Draft::new(base),
            cancel,
            owns_lane,
            finished: false,
            opened_at: Instant::now(),
            batch_size: 1,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn origin(&self) -> &TxnOrigin {
        &self.origin
    }

    /// True once the invocation that opened this handle was canceled.
    /// Committing then aborts instead.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Draft state, including this transaction's own writes.
    pub fn state(&self) -> &Value {
        self.draft.state()
    }

    /// Draft value at a dotted path. Malformed paths read as absent.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let parsed = FieldPath::parse(path).ok()?;
        self.draft.get(&parsed)
    }

    pub fn read(&self, path: &FieldPath) -> Option<&Value> {
        self.draft.get(path)
    }

    pub fn patches(&self) -> &[Patch] {
        self.draft.patches()
    }

    /// Writes `value` at `path`. Writing an equal value records nothing.
    pub fn update(&mut self, path: &str, value: Value) -> Result<(), TransactionError> {
        let parsed = FieldPath::parse(path)?;
        self.update_at(parsed, value);
        Ok(())
    }

    pub fn update_at(&mut self, path: FieldPath, value: Value) {
        let from = self.draft.get(&path).cloned();
        if from.as_ref() == Some(&value) {
            return;
        }
        let reason = self.reason.clone();
        self.draft.record(path, from, Some(value), reason, None, None);
    }

    /// Removes the field at `path`, returning what was there.
    pub fn remove(&mut self, path: &str) -> Result<Option<Value>, TransactionError> {
        let parsed = FieldPath::parse(path)?;
        let from = self.draft.get(&parsed).cloned();
        if from.is_some() {
            let reason = self.reason.clone();
            self.draft.record(parsed, from.clone(), None, reason, None, None);
        }
        Ok(from)
    }

    /// Appends a patch with an explicit reason and applies it to the draft.
    pub fn record_patch(&mut self, path: FieldPath, from: Option<Value>, to: Option<Value>, reason: PatchReason) {
        self.draft.record(path, from, to, reason, None, None);
    }

    /// Opaque in-place edit of the whole draft. Marks the transaction dirty-all.
    pub fn mutate<F: FnOnce(&mut Value)>(&mut self, f: F) {
        self.draft.mutate(PatchReason::Mutate, f);
    }

    /// Replaces the whole state. Marks the transaction dirty-all.
    pub fn replace(&mut self, state: Value) {
        let from = Some(self.draft.state().clone());
        self.draft
            .record(FieldPath::root(), from, Some(state), PatchReason::Mutate, None, None);
    }

    /// Converges, publishes and releases the lane. Returns the committed
    /// state. A transaction with no patches commits silently.
    pub fn commit(mut self) -> Result<Arc<Value>, TransactionError> {
        let result = self.finish_commit();
        if self.owns_lane {
            TransactionManager::release_lane(&self.manager);
        }
        result
    }

    /// Discards the draft. Nothing is published.
    pub fn abort(mut self, cause: &str) {
        self.finish_abort(cause);
        if self.owns_lane {
            TransactionManager::release_lane(&self.manager);
        }
    }

    pub(crate) fn savepoint(&self) -> Savepoint {
        self.draft.savepoint()
    }

    pub(crate) fn rollback_to(&mut self, savepoint: Savepoint) {
        self.draft.rollback_to(savepoint);
    }

    /// Commit for handles driven by the backlog drain; the lane stays held.
    pub(crate) fn commit_in_lane(mut self, batch_size: usize) -> Result<Arc<Value>, TransactionError> {
        self.batch_size = batch_size;
        self.finish_commit()
    }

    /// Marks an undeliverable handle finished without touching the lane.
    pub(crate) fn disarm(mut self) {
        self.finished = true;
    }

    fn take_draft(&mut self) -> Draft {
        self.finished = true;
        std::mem::replace(&mut self.draft, Draft::new(Value::Null))
    }

    fn finish_commit(&mut self) -> Result<Arc<Value>, TransactionError> {
        let draft = self.take_draft();
        self.manager.commit_draft(
            self.id,
            &self.origin,
            draft,
            self.cancel.as_ref(),
            self.opened_at,
            self.batch_size,
        )
    }

    fn finish_abort(&mut self, cause: &str) {
        let draft = self.take_draft();
        self.manager
            .abort_draft(self.id, &self.origin, cause, draft.patches().len());
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finish_abort("dropped");
        if self.owns_lane {
            TransactionManager::release_lane(&self.manager);
        }
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .field("origin", &self.origin.to_string())
            .field("patches", &self.draft.patches().len())
            .field("finished", &self.finished)
            .finish()
    }
}
