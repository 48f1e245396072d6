// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::engine::{ConvergePass, ConvergeReport, ConvergerFactory, FullConverger, SourceRefresh};
use crate::errors::{panic_message, HandlerError, TransactionError};
use crate::graph::TraitGraph;
use crate::observability::messages::converge::{
    ConvergeCompleted, ConvergenceIncomplete, ConvergencePanicked,
};
use crate::observability::messages::transaction::{
    BacklogPressure, TransactionAborted, TransactionCommitted, WriteCoalesced, WriteQueued,
    WriteRejected,
};
use crate::observability::messages::StructuredLog;
use crate::observability::{DiagnosticKind, DiagnosticsLevel, DiagnosticsSink};
use crate::state::{Draft, Patch};
use crate::traits::Converger;
use crate::transaction::backlog::{Backlog, Queued, Request, Waiter};
use crate::transaction::{
    BacklogSnapshot, CommitEvent, TransactionConfig, TransactionHandle, TransactionRecord,
    TxnOrigin,
};

/// Called synchronously with every [`CommitEvent`], in commit order.
pub type CommitCallback = Arc<dyn Fn(&CommitEvent) + Send + Sync>;

type WriteBody = Box<dyn FnOnce(&mut TransactionHandle) -> Result<(), HandlerError> + Send>;
type RefreshHook = Box<dyn Fn(Vec<SourceRefresh>) + Send + Sync>;

const COMMIT_CHANNEL_CAPACITY: usize = 256;

struct OpenWaiter {
    reply: oneshot::Sender<TransactionHandle>,
    cancel: Option<CancellationToken>,
}

impl Waiter for OpenWaiter {
    fn is_abandoned(&self) -> bool {
        self.reply.is_closed() || self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Decides who settles a queued body: the lane once it starts the body,
/// or the caller if it withdraws first.
#[derive(Clone, Default)]
struct BodyClaim(Arc<AtomicU8>);

impl BodyClaim {
    const PENDING: u8 = 0;
    const STARTED: u8 = 1;
    const WITHDRAWN: u8 = 2;

    fn start(&self) -> bool {
        self.0
            .compare_exchange(Self::PENDING, Self::STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn withdraw(&self) -> bool {
        self.0
            .compare_exchange(Self::PENDING, Self::WITHDRAWN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_withdrawn(&self) -> bool {
        self.0.load(Ordering::Acquire) == Self::WITHDRAWN
    }
}

struct QueuedBody {
    body: WriteBody,
    cancel: Option<CancellationToken>,
    claim: BodyClaim,
    reply: oneshot::Sender<Result<(), HandlerError>>,
}

impl QueuedBody {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

impl Waiter for QueuedBody {
    fn is_abandoned(&self) -> bool {
        self.reply.is_closed() || self.is_cancelled() || self.claim.is_withdrawn()
    }
}

struct LaneState {
    held: bool,
    closed: bool,
    backlog: Backlog<OpenWaiter, QueuedBody>,
    last_pressure_warning: Option<Instant>,
}

/// What happened to a request that could not take the lane immediately.
enum Contended {
    Queued { pending: usize },
    Coalesced { batch_size: usize },
}

/// Owns a module's committed state and its single writer lane.
///
/// * [`open`](Self::open) hands out a [`TransactionHandle`] once the lane
///   is free, queueing behind the current holder otherwise
/// * [`run`](Self::run) submits a synchronous write body; queued bodies
///   with the same origin are coalesced into one transaction
///
/// When a holder finishes, the lane is handed straight to the next queued
/// request. Queued batches run on the releasing thread; a queued `open`
/// receives its handle and the drain stops.
pub struct TransactionManager {
    module_id: Arc<str>,
    config: TransactionConfig,
    converger: Box<dyn Converger>,
    graph: RwLock<Arc<TraitGraph>>,
    lane: Mutex<LaneState>,
    state_tx: watch::Sender<Arc<Value>>,
    commits_tx: broadcast::Sender<Arc<CommitEvent>>,
    subscribers: Mutex<Vec<(u64, CommitCallback)>>,
    next_subscriber_id: AtomicU64,
    next_txn_id: AtomicU64,
    converge_seq: AtomicU64,
    history: Mutex<VecDeque<TransactionRecord>>,
    sink: DiagnosticsSink,
    refresh_hook: OnceLock<RefreshHook>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TransactionManager {
    pub fn new(module_id: &str, initial_state: Value, config: TransactionConfig, sink: DiagnosticsSink) -> Arc<Self> {
        let (state_tx, _) = watch::channel(Arc::new(initial_state));
        let (commits_tx, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        let converger = ConvergerFactory::from_mode(config.converge_mode);
        let backlog = Backlog::new(config.lanes);

        Arc::new(Self {
            module_id: Arc::from(module_id),
            converger,
            graph: RwLock::new(Arc::new(TraitGraph::empty())),
            lane: Mutex::new(LaneState {
                held: false,
                closed: false,
                backlog,
                last_pressure_warning: None,
            }),
            state_tx,
            commits_tx,
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
            next_txn_id: AtomicU64::new(1),
            converge_seq: AtomicU64::new(0),
            history: Mutex::new(VecDeque::new()),
            sink,
            refresh_hook: OnceLock::new(),
            config,
        })
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    pub fn converger_name(&self) -> &'static str {
        self.converger.name()
    }

    /// Last committed state. Never a draft.
    pub fn snapshot(&self) -> Arc<Value> {
        self.state_tx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<Arc<Value>> {
        self.state_tx.subscribe()
    }

    pub fn commits(&self) -> broadcast::Receiver<Arc<CommitEvent>> {
        self.commits_tx.subscribe()
    }

    pub fn diagnostics(&self) -> &DiagnosticsSink {
        &self.sink
    }

    pub fn graph(&self) -> Arc<TraitGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn subscribe(&self, callback: CommitCallback) -> u64 {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Receives the source loads scheduled by each commit. Set once.
    pub fn set_refresh_hook<F>(&self, hook: F) -> bool
    where
        F: Fn(Vec<SourceRefresh>) + Send + Sync + 'static,
    {
        self.refresh_hook.set(Box::new(hook)).is_ok()
    }

    pub fn backlog(&self) -> BacklogSnapshot {
        lock(&self.lane).backlog.snapshot()
    }

    /// Committed transactions, oldest first. Empty unless diagnostics are `full`.
    pub fn history(&self) -> Vec<TransactionRecord> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.lane).closed
    }

    /// Rejects new requests and disconnects everything still queued.
    pub fn close(&self) {
        let dropped = {
            let mut lane = lock(&self.lane);
            lane.closed = true;
            lane.backlog.drain()
        };
        drop(dropped);
    }

    /// Installs a compiled graph and brings the committed state in line
    /// with it through one full pass. Subscribers are not notified.
    pub fn install_graph(&self, graph: Arc<TraitGraph>) -> Result<ConvergeReport, TransactionError> {
        *self.graph.write().unwrap_or_else(PoisonError::into_inner) = graph.clone();

        let mut draft = Draft::new((*self.snapshot()).clone());
        let converged = catch_unwind(AssertUnwindSafe(|| {
            let mut pass = ConvergePass {
                graph: &graph,
                draft: &mut draft,
                budget: &self.config.budget,
                txn_seq: 0,
                collect_hotspots: false,
            };
            FullConverger::new().converge(&mut pass)
        }));
        let mut report = converged.map_err(|panic| {
            let message = panic_message(panic);
            ConvergencePanicked {
                module_id: &self.module_id,
                txn_id: 0,
                message: &message,
            }
            .log();
            TransactionError::ConvergencePanicked { txn_id: 0, message }
        })?;

        let (state, _) = draft.into_parts();
        self.state_tx.send_replace(Arc::new(state));
        let refreshes = std::mem::take(&mut report.refreshes);
        self.schedule_refreshes(refreshes);
        Ok(report)
    }

    /// Waits for the writer lane and returns an open transaction.
    pub async fn open(self: &Arc<Self>, origin: TxnOrigin) -> Result<TransactionHandle, TransactionError> {
        self.open_inner(origin, None).await
    }

    /// Like [`open`](Self::open), bound to a cancellation token. Cancelling
    /// while queued gives up the place in the backlog; cancelling after the
    /// handle is granted makes its commit abort.
    pub async fn open_with(
        self: &Arc<Self>,
        origin: TxnOrigin,
        cancel: CancellationToken,
    ) -> Result<TransactionHandle, TransactionError> {
        self.open_inner(origin, Some(cancel)).await
    }

    async fn open_inner(
        self: &Arc<Self>,
        origin: TxnOrigin,
        cancel: Option<CancellationToken>,
    ) -> Result<TransactionHandle, TransactionError> {
        if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(TransactionError::Canceled);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut lane = lock(&self.lane);
            self.check_accepting(&lane, &origin)?;
            if !lane.held {
                lane.held = true;
                drop(lane);
                return Ok(self.grant(origin, cancel, true));
            }
            let waiter = OpenWaiter {
                reply: tx,
                cancel: cancel.clone(),
            };
            let pending = lane.backlog.push_open(origin.clone(), waiter);
            let report = self.after_enqueue(&mut lane, &origin, Contended::Queued { pending });
            drop(lane);
            report();
        }

        let granted = match &cancel {
            Some(token) => tokio::select! {
                biased;
                handle = rx => handle,
                _ = token.cancelled() => return Err(TransactionError::Canceled),
            },
            None => rx.await,
        };
        granted.map_err(|_| self.disconnected(cancel.as_ref()))
    }

    /// Runs `body` in a transaction and commits it.
    ///
    /// Runs on the caller's thread when the lane is free. Otherwise the body
    /// is queued, joining a pending batch with the same origin when
    /// coalescing is enabled; a batch commits once and notifies once. A
    /// failing body only rolls back its own writes.
    ///
    /// A cancel that fires before the body starts withdraws it. Once the
    /// body has started, the lane settles it: a cancel observed by the end
    /// of the body rolls its writes back, anything later commits and is
    /// reported as such.
    pub async fn run<F>(
        self: &Arc<Self>,
        origin: TxnOrigin,
        cancel: Option<CancellationToken>,
        body: F,
    ) -> Result<(), HandlerError>
    where
        F: FnOnce(&mut TransactionHandle) -> Result<(), HandlerError> + Send + 'static,
    {
        if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(HandlerError::Canceled);
        }

        let (tx, mut rx) = oneshot::channel();
        let claim = BodyClaim::default();
        let queued = QueuedBody {
            body: Box::new(body),
            cancel: cancel.clone(),
            claim: claim.clone(),
            reply: tx,
        };

        let inline = {
            let mut lane = lock(&self.lane);
            self.check_accepting(&lane, &origin)?;
            if lane.held {
                let contended = match lane.backlog.push_body(origin.clone(), queued) {
                    Queued::New { pending } => Contended::Queued { pending },
                    Queued::Coalesced { batch_size, .. } => Contended::Coalesced { batch_size },
                };
                let report = self.after_enqueue(&mut lane, &origin, contended);
                drop(lane);
                report();
                None
            } else {
                lane.held = true;
                Some(queued)
            }
        };
        if let Some(queued) = inline {
            self.execute_batch(origin, vec![queued]);
            self.release_lane();
        }

        let outcome = match &cancel {
            Some(token) => tokio::select! {
                biased;
                outcome = &mut rx => outcome,
                _ = token.cancelled() => {
                    if claim.withdraw() {
                        return Err(HandlerError::Canceled);
                    }
                    rx.await
                }
            },
            None => rx.await,
        };
        outcome.unwrap_or_else(|_| Err(self.disconnected(cancel.as_ref()).into()))
    }

    fn disconnected(&self, cancel: Option<&CancellationToken>) -> TransactionError {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            TransactionError::Canceled
        } else {
            TransactionError::ManagerClosed {
                module_id: self.module_id.to_string(),
            }
        }
    }

    fn check_accepting(&self, lane: &LaneState, origin: &TxnOrigin) -> Result<(), TransactionError> {
        if lane.closed {
            return Err(TransactionError::ManagerClosed {
                module_id: self.module_id.to_string(),
            });
        }
        if lane.held && lane.backlog.is_full() {
            let pending = lane.backlog.len();
            let origin = origin.to_string();
            WriteRejected {
                module_id: &self.module_id,
                origin: &origin,
                pending,
            }
            .log();
            self.sink.emit(DiagnosticsLevel::Light, DiagnosticKind::TxnLane, None, || {
                let mut payload = lane.backlog.snapshot().to_diagnostic_payload();
                payload["rejected"] = json!(origin);
                payload
            });
            return Err(TransactionError::BacklogFull {
                module_id: self.module_id.to_string(),
                pending,
            });
        }
        Ok(())
    }

    /// Collects what needs logging while the lane lock is held; the
    /// returned closure does the logging after it is released.
    fn after_enqueue<'a>(
        &'a self,
        lane: &mut LaneState,
        origin: &TxnOrigin,
        contended: Contended,
    ) -> impl FnOnce() + 'a {
        let pressure = self.pressure_check(lane);
        let snapshot = self
            .sink
            .enabled(DiagnosticsLevel::Light)
            .then(|| lane.backlog.snapshot());
        let origin = origin.to_string();

        move || {
            match contended {
                Contended::Queued { pending } => WriteQueued {
                    module_id: &self.module_id,
                    origin: &origin,
                    pending,
                }
                .log(),
                Contended::Coalesced { batch_size } => WriteCoalesced {
                    module_id: &self.module_id,
                    origin: &origin,
                    batch_size,
                }
                .log(),
            }
            if let Some((pending, oldest_age)) = pressure {
                BacklogPressure {
                    module_id: &self.module_id,
                    pending,
                    threshold: self.config.pressure_threshold,
                    oldest_age,
                }
                .log();
            }
            if let Some(snapshot) = snapshot {
                self.sink.emit(DiagnosticsLevel::Light, DiagnosticKind::TxnLane, None, || {
                    snapshot.to_diagnostic_payload()
                });
            }
        }
    }

    fn pressure_check(&self, lane: &mut LaneState) -> Option<(usize, Duration)> {
        let pending = lane.backlog.len();
        if pending < self.config.pressure_threshold {
            return None;
        }
        let now = Instant::now();
        let cooling = lane
            .last_pressure_warning
            .is_some_and(|at| now.duration_since(at) < self.config.pressure_cooldown);
        if cooling {
            return None;
        }
        lane.last_pressure_warning = Some(now);
        Some((pending, lane.backlog.oldest_age()))
    }

    fn grant(self: &Arc<Self>, origin: TxnOrigin, cancel: Option<CancellationToken>, owns_lane: bool) -> TransactionHandle {
        let id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        let base = (*self.snapshot()).clone();
        TransactionHandle::new(self.clone(), id, origin, base, cancel, owns_lane)
    }

    /// Hands the lane to queued requests until one keeps it or none remain.
    pub(crate) fn release_lane(self: &Arc<Self>) {
        loop {
            let entry = {
                let mut lane = lock(&self.lane);
                match lane.backlog.pop_next() {
                    Some(entry) => entry,
                    None => {
                        lane.held = false;
                        return;
                    }
                }
            };

            match entry.request {
                Request::Open(waiter) => {
                    let handle = self.grant(entry.origin, waiter.cancel, true);
                    match waiter.reply.send(handle) {
                        Ok(()) => return,
                        Err(handle) => {
                            handle.disarm();
                            lock(&self.lane).backlog.note_canceled(1);
                        }
                    }
                }
                Request::Batch(bodies) => self.execute_batch(entry.origin, bodies),
            }
        }
    }

    /// Runs queued bodies back to back in one transaction. The lane must be held.
    fn execute_batch(self: &Arc<Self>, origin: TxnOrigin, bodies: Vec<QueuedBody>) {
        // A lone body's token guards the commit itself.
        let cancel = match bodies.as_slice() {
            [only] => only.cancel.clone(),
            _ => None,
        };
        let mut handle = self.grant(origin, cancel, false);
        let mut committed = Vec::with_capacity(bodies.len());

        for queued in bodies {
            if queued.is_abandoned() || !queued.claim.start() {
                lock(&self.lane).backlog.note_canceled(1);
                continue;
            }
            let savepoint = handle.savepoint();
            let QueuedBody { body, cancel, reply, .. } = queued;
            let outcome = catch_unwind(AssertUnwindSafe(|| body(&mut handle)))
                .unwrap_or_else(|panic| Err(HandlerError::from_panic(panic)));
            let outcome = match outcome {
                Ok(()) if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) => {
                    Err(HandlerError::Canceled)
                }
                other => other,
            };
            match outcome {
                Ok(()) => committed.push(reply),
                Err(error) => {
                    handle.rollback_to(savepoint);
                    let _ = reply.send(Err(error));
                }
            }
        }

        let result = handle.commit_in_lane(committed.len());
        for reply in committed {
            let _ = reply.send(result.clone().map(|_| ()).map_err(HandlerError::from));
        }
    }

    pub(crate) fn abort_draft(&self, txn_id: u64, origin: &TxnOrigin, cause: &str, discarded_patches: usize) {
        let origin = origin.to_string();
        TransactionAborted {
            module_id: &self.module_id,
            txn_id,
            origin: &origin,
            cause,
            discarded_patches,
        }
        .log();
    }

    pub(crate) fn commit_draft(
        &self,
        txn_id: u64,
        origin: &TxnOrigin,
        mut draft: Draft,
        cancel: Option<&CancellationToken>,
        opened_at: Instant,
        batch_size: usize,
    ) -> Result<Arc<Value>, TransactionError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            self.abort_draft(txn_id, origin, "canceled", draft.patches().len());
            return Err(TransactionError::Canceled);
        }
        if draft.patches().is_empty() {
            return Ok(self.snapshot());
        }

        let graph = self.graph();
        let txn_seq = self.converge_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let converged = catch_unwind(AssertUnwindSafe(|| {
            let mut pass = ConvergePass {
                graph: &graph,
                draft: &mut draft,
                budget: &self.config.budget,
                txn_seq,
                collect_hotspots: self.sink.enabled(DiagnosticsLevel::Full),
            };
            self.converger.converge(&mut pass)
        }));
        let mut report = match converged {
            Ok(report) => report,
            Err(panic) => {
                let message = panic_message(panic);
                ConvergencePanicked {
                    module_id: &self.module_id,
                    txn_id,
                    message: &message,
                }
                .log();
                self.abort_draft(txn_id, origin, "convergence panicked", draft.patches().len());
                return Err(TransactionError::ConvergencePanicked { txn_id, message });
            }
        };

        let (state, patches) = draft.into_parts();
        let state = Arc::new(state);
        let patches: Arc<[Patch]> = Arc::from(patches);
        self.state_tx.send_replace(state.clone());

        let origin_label = origin.to_string();
        self.report_convergence(txn_id, &origin_label, &report, &patches);

        let duration = opened_at.elapsed();
        if self.sink.enabled(DiagnosticsLevel::Full) {
            self.push_history(TransactionRecord {
                txn_id,
                origin: origin.clone(),
                duration,
                patch_count: patches.len(),
                executed: report.executed,
                decision: report.decision,
                convergence_incomplete: report.incomplete,
            });
        }

        let event = Arc::new(CommitEvent {
            txn_id,
            origin: origin.clone(),
            state: state.clone(),
            patches,
            convergence_incomplete: report.incomplete,
            batch_size,
        });
        self.notify(&event);
        let _ = self.commits_tx.send(event.clone());

        TransactionCommitted {
            module_id: &self.module_id,
            txn_id,
            origin: &origin_label,
            patch_count: event.patches.len(),
            duration,
        }
        .log();

        let refreshes = std::mem::take(&mut report.refreshes);
        self.schedule_refreshes(refreshes);
        Ok(state)
    }

    fn report_convergence(&self, txn_id: u64, origin: &str, report: &ConvergeReport, patches: &[Patch]) {
        let mode = report.executed.to_string();
        ConvergeCompleted {
            module_id: &self.module_id,
            txn_id,
            mode: &mode,
            evaluated: report.evaluated_nodes,
            total: report.total_nodes,
            duration: report.duration,
        }
        .log();
        if report.incomplete {
            ConvergenceIncomplete {
                module_id: &self.module_id,
                txn_id,
                evaluated: report.evaluated_nodes,
                skipped: report.skipped_nodes,
                budget: self.config.budget.converge,
            }
            .log();
        }

        self.sink.emit(DiagnosticsLevel::Light, DiagnosticKind::TraitDecision, Some(txn_id), || {
            let mut payload = report.to_diagnostic_payload();
            payload["origin"] = json!(origin);
            payload["convergenceIncomplete"] = json!(report.incomplete);
            payload
        });
        self.sink.emit(DiagnosticsLevel::Full, DiagnosticKind::Patch, Some(txn_id), || {
            json!({
                "origin": origin,
                "patchCount": patches.len(),
                "patches": patches,
            })
        });
    }

    fn push_history(&self, record: TransactionRecord) {
        let mut history = lock(&self.history);
        history.push_back(record);
        while history.len() > self.config.max_history {
            history.pop_front();
        }
    }

    fn notify(&self, event: &CommitEvent) {
        let subscribers: Vec<CommitCallback> = lock(&self.subscribers)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in subscribers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                tracing::error!(
                    module_id = %self.module_id,
                    txn_id = event.txn_id,
                    "commit subscriber panicked: {}",
                    panic_message(panic)
                );
            }
        }
    }

    fn schedule_refreshes(&self, refreshes: Vec<SourceRefresh>) {
        if refreshes.is_empty() {
            return;
        }
        match self.refresh_hook.get() {
            Some(hook) => hook(refreshes),
            None => tracing::debug!(
                module_id = %self.module_id,
                count = refreshes.len(),
                "no refresh hook installed; source loads skipped"
            ),
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("module_id", &self.module_id)
            .field("converger", &self.converger.name())
            .finish()
    }
}
