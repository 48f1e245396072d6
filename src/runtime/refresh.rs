// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio_util::sync::CancellationToken;

use crate::engine::{SourceRefresh, SourceSnapshot, SourceStatus};
use crate::graph::TraitNodeId;
use crate::observability::messages::task::{SourceLoadFailed, StaleSourceResult};
use crate::observability::messages::StructuredLog;
use crate::transaction::{TransactionManager, TxnOrigin};

/// Runs the source loads scheduled by commits and writes their results
/// back in `source-refresh` transactions.
///
/// One load per source node is live at a time; scheduling a newer one
/// cancels the older.
pub(crate) struct SourceRefresher {
    module_id: Arc<str>,
    manager: Weak<TransactionManager>,
    scope: CancellationToken,
    inflight: Mutex<HashMap<TraitNodeId, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
}

impl SourceRefresher {
    pub(crate) fn new(module_id: Arc<str>, manager: &Arc<TransactionManager>, scope: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            module_id,
            manager: Arc::downgrade(manager),
            scope,
            inflight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        })
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<TraitNodeId, (u64, CancellationToken)>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn pending(&self) -> usize {
        self.inflight().len()
    }

    pub(crate) fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.inflight().drain().collect();
        for (_, (_, cancel)) in &drained {
            cancel.cancel();
        }
        drained.len()
    }

    pub(crate) fn schedule(self: &Arc<Self>, refreshes: Vec<SourceRefresh>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!(
                    module_id = %self.module_id,
                    count = refreshes.len(),
                    "no async runtime available; source loads not started"
                );
                return;
            }
        };

        for refresh in refreshes {
            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
            let cancel = self.scope.child_token();
            let superseded = self.inflight().insert(refresh.node_id, (generation, cancel.clone()));
            if let Some((_, previous)) = superseded {
                previous.cancel();
            }
            runtime.spawn(self.clone().load(refresh, generation, cancel));
        }
    }

    async fn load(self: Arc<Self>, refresh: SourceRefresh, generation: u64, cancel: CancellationToken) {
        let field_path = refresh.field_path.to_string();
        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.finish(refresh.node_id, generation);
                return;
            }
            loaded = refresh.resource.load(refresh.key.clone()) => loaded,
        };

        let snapshot = match loaded {
            Ok(data) => SourceSnapshot::success(refresh.key.clone(), data),
            Err(e) => {
                let message = format!("{:#}", e);
                SourceLoadFailed {
                    module_id: &self.module_id,
                    field_path: &field_path,
                    error: &message,
                }
                .log();
                SourceSnapshot::error(refresh.key.clone(), message)
            }
        };

        if let Some(manager) = self.manager.upgrade() {
            let module_id = self.module_id.clone();
            let path = refresh.field_path.clone();
            let key = refresh.key.clone();
            let origin = TxnOrigin::source_refresh(&field_path);
            let written = manager
                .run(origin, Some(cancel), move |txn| {
                    // The key may have moved on while the load was running.
                    let requested = txn
                        .read(&path)
                        .and_then(SourceSnapshot::from_value)
                        .is_some_and(|current| {
                            current.status == SourceStatus::Loading && current.key.as_ref() == Some(&key)
                        });
                    if requested {
                        txn.update_at(path, snapshot.to_value());
                    } else {
                        StaleSourceResult {
                            module_id: &module_id,
                            field_path: &path.to_string(),
                        }
                        .log();
                    }
                    Ok(())
                })
                .await;
            if let Err(e) = written {
                if !e.is_canceled() {
                    tracing::warn!(
                        module_id = %self.module_id,
                        field_path = %field_path,
                        "source result not written: {}",
                        e
                    );
                }
            }
        }
        self.finish(refresh.node_id, generation);
    }

    fn finish(&self, node_id: TraitNodeId, generation: u64) {
        let mut inflight = self.inflight();
        if inflight.get(&node_id).is_some_and(|(current, _)| *current == generation) {
            inflight.remove(&node_id);
        }
    }
}
