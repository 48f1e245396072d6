// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::errors::{HandlerError, ModuleError};
use crate::observability::messages::task::{
    InvocationCanceled, InvocationFailed, OccurrenceDropped, RunnerStarted, RunnerStopped,
};
use crate::observability::messages::StructuredLog;
use crate::runtime::ModuleInstance;
use crate::task::{TaskContext, TaskPolicy, TriggerStream};
use crate::traits::TaskHandler;

/// Live counters for one runner.
#[derive(Debug, Default)]
pub struct RunnerStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    canceled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
}

/// Point-in-time copy of [`RunnerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSnapshot {
    /// Occurrences that started an invocation
    pub accepted: u64,
    /// Occurrences refused by `exhaust`
    pub dropped: u64,
    pub canceled: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: u64,
}

impl RunnerStats {
    pub fn snapshot(&self) -> RunnerSnapshot {
        RunnerSnapshot {
            accepted: self.accepted.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            canceled: self.canceled.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            in_flight: self.in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Binds a trigger stream to a handler under a [`TaskPolicy`].
///
/// # Example
///
/// ```rust,no_run
/// use serde_json::{json, Value};
/// use the_statewood::errors::HandlerError;
/// use the_statewood::runtime::ModuleInstance;
/// use the_statewood::task::{TaskContext, TaskPolicy, TaskRunner};
///
/// # async fn demo(module: ModuleInstance) -> Result<(), Box<dyn std::error::Error>> {
/// let runner = TaskRunner::new("search", TaskPolicy::Latest).spawn(
///     &module,
///     module.on_action("search"),
///     |ctx: TaskContext, query: Value| async move {
///         ctx.sleep(std::time::Duration::from_millis(300)).await?;
///         ctx.update("results", json!([query])).await?;
///         Ok::<(), HandlerError>(())
///     },
/// )?;
/// let stats = runner.stop().await;
/// println!("{} canceled", stats.canceled);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TaskRunner {
    name: String,
    policy: TaskPolicy,
}

impl TaskRunner {
    pub fn new(name: &str, policy: TaskPolicy) -> Self {
        Self {
            name: name.to_string(),
            policy,
        }
    }

    /// Starts the supervisor loop. Must be called within a Tokio runtime.
    ///
    /// The runner stops when `triggers` ends, when [`RunnerHandle::stop`]
    /// is called or when the module is released.
    pub fn spawn<P, H>(
        self,
        module: &ModuleInstance,
        triggers: TriggerStream<P>,
        handler: H,
    ) -> Result<RunnerHandle, ModuleError>
    where
        P: Send + 'static,
        H: TaskHandler<P> + 'static,
    {
        if module.is_released() {
            return Err(ModuleError::Released {
                module_id: module.id().to_string(),
            });
        }

        let name: Arc<str> = Arc::from(self.name.as_str());
        let stats = Arc::new(RunnerStats::default());
        let stop = module.scope().child_token();
        let invoker = Arc::new(Invoker {
            module: module.clone(),
            name: name.clone(),
            handler: Arc::new(handler),
            stats: stats.clone(),
            next_id: AtomicU64::new(1),
            _payload: PhantomData,
        });

        let policy = self.policy.to_string();
        RunnerStarted {
            module_id: module.id(),
            runner: &name,
            policy: &policy,
        }
        .log();

        let join = tokio::spawn(supervise(invoker, self.policy, triggers, stop.clone()));
        Ok(RunnerHandle {
            name,
            policy: self.policy,
            stats,
            stop,
            join,
        })
    }
}

/// Owner's handle on a running [`TaskRunner`].
#[derive(Debug)]
pub struct RunnerHandle {
    name: Arc<str>,
    policy: TaskPolicy,
    stats: Arc<RunnerStats>,
    stop: CancellationToken,
    join: JoinHandle<()>,
}

impl RunnerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> TaskPolicy {
        self.policy
    }

    pub fn stats(&self) -> RunnerSnapshot {
        self.stats.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops pulling triggers. `latest`/`exhaust` invocations are canceled;
    /// `parallel` invocations are awaited. Returns the final counters.
    pub async fn stop(self) -> RunnerSnapshot {
        self.stop.cancel();
        self.join().await
    }

    /// Waits for the trigger stream to end and the runner to wind down.
    pub async fn join(self) -> RunnerSnapshot {
        if let Err(e) = self.join.await {
            tracing::error!(runner = %self.name, "runner supervisor failed: {}", e);
        }
        self.stats.snapshot()
    }
}

struct Invoker<P, H> {
    module: ModuleInstance,
    name: Arc<str>,
    handler: Arc<H>,
    stats: Arc<RunnerStats>,
    next_id: AtomicU64,
    _payload: PhantomData<fn(P)>,
}

impl<P, H> Invoker<P, H>
where
    P: Send + 'static,
    H: TaskHandler<P> + 'static,
{
    fn start(&self, cancel: CancellationToken, current: Option<Arc<AtomicU64>>) -> TaskContext {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Some(current) = &current {
            current.store(id, Ordering::SeqCst);
        }
        self.stats.accepted.fetch_add(1, Ordering::SeqCst);
        self.stats.in_flight.fetch_add(1, Ordering::SeqCst);
        TaskContext::new(self.module.clone(), self.name.clone(), id, cancel, current)
    }

    fn finish(&self, invocation_id: u64, outcome: Result<(), HandlerError>) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        match outcome {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) if e.is_canceled() => {
                self.stats.canceled.fetch_add(1, Ordering::SeqCst);
                InvocationCanceled {
                    module_id: self.module.id(),
                    runner: &self.name,
                    invocation_id,
                }
                .log();
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                InvocationFailed {
                    module_id: self.module.id(),
                    runner: &self.name,
                    invocation_id,
                    error: &e,
                }
                .log();
                self.module.report_error(&self.name, &e);
            }
        }
    }
}

/// Runs one invocation. The handler runs in its own task so a panic is
/// contained and cancellation can drop it at any await point.
async fn invoke<P, H>(invoker: Arc<Invoker<P, H>>, ctx: TaskContext, payload: P)
where
    P: Send + 'static,
    H: TaskHandler<P> + 'static,
{
    let id = ctx.invocation_id();
    let cancel = ctx.cancellation().clone();
    let handler = invoker.handler.clone();
    let mut work = tokio::spawn(async move { handler.handle(ctx, payload).await });

    let outcome = tokio::select! {
        biased;
        joined = &mut work => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(HandlerError::from_panic(e.into_panic())),
            Err(_) => Err(HandlerError::Canceled),
        },
        _ = cancel.cancelled() => {
            // Wait for the abort so any open transaction is dropped first.
            work.abort();
            let _ = work.await;
            Err(HandlerError::Canceled)
        }
    };
    invoker.finish(id, outcome);
}

async fn supervise<P, H>(
    invoker: Arc<Invoker<P, H>>,
    policy: TaskPolicy,
    mut triggers: TriggerStream<P>,
    stop: CancellationToken,
) where
    P: Send + 'static,
    H: TaskHandler<P> + 'static,
{
    let mut group = JoinSet::new();
    let mut current: Option<(CancellationToken, JoinHandle<()>)> = None;
    // Superseded `latest` invocations still winding down.
    let mut retired: Vec<JoinHandle<()>> = Vec::new();
    let newest = Arc::new(AtomicU64::new(0));
    // Invocations of policies that survive a stop hang off the module scope.
    let parent = if policy.cancels_on_stop() {
        stop.clone()
    } else {
        invoker.module.scope().clone()
    };

    loop {
        let payload = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            Some(joined) = group.join_next(), if !group.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(runner = %invoker.name, "parallel invocation failed to join: {}", e);
                }
                continue;
            }
            next = triggers.recv() => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        match policy {
            TaskPolicy::Task => {
                let ctx = invoker.start(parent.child_token(), None);
                tokio::spawn(invoke(invoker.clone(), ctx, payload));
            }
            TaskPolicy::Parallel => {
                let ctx = invoker.start(parent.child_token(), None);
                group.spawn(invoke(invoker.clone(), ctx, payload));
            }
            TaskPolicy::Latest => {
                if let Some((previous, running)) = current.take() {
                    previous.cancel();
                    retired.retain(|handle| !handle.is_finished());
                    retired.push(running);
                }
                let cancel = parent.child_token();
                let ctx = invoker.start(cancel.clone(), Some(newest.clone()));
                current = Some((cancel, tokio::spawn(invoke(invoker.clone(), ctx, payload))));
            }
            TaskPolicy::Exhaust => {
                let busy = current.as_ref().is_some_and(|(_, running)| !running.is_finished());
                if busy {
                    invoker.stats.dropped.fetch_add(1, Ordering::SeqCst);
                    OccurrenceDropped {
                        module_id: invoker.module.id(),
                        runner: &invoker.name,
                    }
                    .log();
                    continue;
                }
                let cancel = parent.child_token();
                let ctx = invoker.start(cancel.clone(), None);
                current = Some((cancel, tokio::spawn(invoke(invoker.clone(), ctx, payload))));
            }
        }
    }

    if let Some((_, running)) = current.take() {
        retired.push(running);
    }
    for running in retired {
        let _ = running.await;
    }
    while group.join_next().await.is_some() {}

    let stats = invoker.stats.snapshot();
    RunnerStopped {
        module_id: invoker.module.id(),
        runner: &invoker.name,
        accepted: stats.accepted,
        dropped: stats.dropped,
        canceled: stats.canceled,
        failed: stats.failed,
    }
    .log();
}
