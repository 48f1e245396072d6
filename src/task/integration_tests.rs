// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use crate::errors::{HandlerError, ModuleError};
use crate::observability::{DiagnosticsLevel, DiagnosticsSink};
use crate::runtime::{Action, ModuleInstance};
use crate::task::{TaskContext, TaskLifecycle, TaskPolicy, TaskRunner, TriggerStream};
use crate::transaction::TransactionConfig;

fn running(id: &str, state: Value) -> ModuleInstance {
    let module = ModuleInstance::new(
        id,
        state,
        TransactionConfig::default(),
        DiagnosticsSink::detached(DiagnosticsLevel::Off, id),
    );
    module.start().unwrap();
    module
}

fn count_commits(module: &ModuleInstance) -> (Arc<AtomicUsize>, crate::runtime::Subscription) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let subscription = module.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (count, subscription)
}

#[tokio::test(start_paused = true)]
async fn test_latest_keeps_only_second_occurrence() {
    let module = running("search", json!({}));
    let mut calls = module.actions();
    let (commits, _subscription) = count_commits(&module);

    let (tx, triggers) = TriggerStream::channel(8);
    let runner = TaskRunner::new("search", TaskPolicy::Latest)
        .spawn(&module, triggers, |ctx: TaskContext, query: i64| async move {
            ctx.sleep(Duration::from_millis(50)).await?;
            ctx.dispatch(Action::new("called", json!(query))).await?;
            ctx.update("result", json!(query)).await?;
            Ok::<(), HandlerError>(())
        })
        .unwrap();

    tx.send(1).await.unwrap();
    tx.send(2).await.unwrap();
    drop(tx);
    let stats = runner.join().await;

    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.canceled, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(module.get("result"), Some(json!(2)));
    assert_eq!(commits.load(Ordering::SeqCst), 1);
    assert_eq!(calls.try_recv().unwrap(), Action::new("called", json!(2)));
    assert!(calls.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_latest_aborts_open_transaction_of_superseded_invocation() {
    let module = running("editor", json!({"text": ""}));
    let (commits, _subscription) = count_commits(&module);

    let (tx, triggers) = TriggerStream::channel(8);
    let runner = TaskRunner::new("autosave", TaskPolicy::Latest)
        .spawn(&module, triggers, |ctx: TaskContext, text: String| async move {
            let mut txn = ctx.begin().await?;
            txn.update("text", json!(text))?;
            ctx.sleep(Duration::from_millis(100)).await?;
            txn.commit()?;
            Ok::<(), HandlerError>(())
        })
        .unwrap();

    tx.send("first".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    tx.send("second".to_string()).await.unwrap();
    drop(tx);
    let stats = runner.join().await;

    assert_eq!(stats.canceled, 1);
    assert_eq!(module.get("text"), Some(json!("second")));
    assert_eq!(commits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhaust_drops_while_busy() {
    let module = running("m", json!({"runs": 0}));
    let (tx, triggers) = TriggerStream::channel(8);
    let runner = TaskRunner::new("refresh", TaskPolicy::Exhaust)
        .spawn(&module, triggers, |ctx: TaskContext, _: ()| async move {
            ctx.sleep(Duration::from_millis(100)).await?;
            ctx.transaction(|txn| {
                let runs = txn.get("runs").and_then(Value::as_i64).unwrap_or(0);
                txn.update("runs", json!(runs + 1))?;
                Ok(())
            })
            .await?;
            Ok::<(), HandlerError>(())
        })
        .unwrap();

    for _ in 0..3 {
        tx.send(()).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(()).await.unwrap();
    drop(tx);
    let stats = runner.join().await;

    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.completed, 2);
    assert_eq!(module.get("runs"), Some(json!(2)));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_runs_all_and_waits_for_group() {
    let module = running("m", json!({"total": 0}));
    let (tx, triggers) = TriggerStream::channel(8);
    let runner = TaskRunner::new("add", TaskPolicy::Parallel)
        .spawn(&module, triggers, |ctx: TaskContext, n: i64| async move {
            ctx.sleep(Duration::from_millis(10 * n as u64)).await?;
            ctx.transaction(move |txn| {
                let total = txn.get("total").and_then(Value::as_i64).unwrap_or(0);
                txn.update("total", json!(total + n))?;
                Ok(())
            })
            .await?;
            Ok::<(), HandlerError>(())
        })
        .unwrap();

    for n in 1..=5 {
        tx.send(n).await.unwrap();
    }
    drop(tx);
    let stats = runner.join().await;

    assert_eq!(stats.completed, 5);
    assert_eq!(stats.canceled, 0);
    assert_eq!(module.get("total"), Some(json!(15)));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_debounce_keeps_occurrence_across_group_reaping() {
    let module = running("m", json!({"runs": 0}));
    let (tx, triggers) = TriggerStream::channel(8);
    let runner = TaskRunner::new("save", TaskPolicy::Parallel)
        .spawn(
            &module,
            triggers.debounce(Duration::from_millis(100)),
            |ctx: TaskContext, _: i64| async move {
                ctx.sleep(Duration::from_millis(50)).await?;
                ctx.transaction(|txn| {
                    let runs = txn.get("runs").and_then(Value::as_i64).unwrap_or(0);
                    txn.update("runs", json!(runs + 1))?;
                    Ok(())
                })
                .await?;
                Ok::<(), HandlerError>(())
            },
        )
        .unwrap();

    tx.send(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    tx.send(2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    drop(tx);
    let stats = runner.join().await;

    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.dropped, 0);
    assert_eq!(module.get("runs"), Some(json!(2)));
}

#[tokio::test]
async fn test_task_invocations_are_detached() {
    let module = running("m", json!({"seen": []}));
    let mut state = module.watch_state();
    let (tx, triggers) = TriggerStream::channel(8);
    let runner = TaskRunner::new("log", TaskPolicy::Task)
        .spawn(&module, triggers, |ctx: TaskContext, entry: i64| async move {
            ctx.transaction(move |txn| {
                let mut seen = txn.get("seen").cloned().unwrap_or_else(|| json!([]));
                if let Value::Array(items) = &mut seen {
                    items.push(json!(entry));
                }
                txn.update("seen", seen)?;
                Ok(())
            })
            .await?;
            Ok::<(), HandlerError>(())
        })
        .unwrap();

    for n in 0..3 {
        tx.send(n).await.unwrap();
    }
    drop(tx);
    runner.join().await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.borrow_and_update()["seen"].as_array().map_or(0, Vec::len) < 3 {
            state.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_failures_and_panics_reach_error_hook() {
    let module = running("m", json!({}));
    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = errors.clone();
        module.on_error(move |source, error| {
            errors.lock().unwrap().push((source.to_string(), error.to_string()));
        });
    }

    let (tx, triggers) = TriggerStream::channel(8);
    let runner = TaskRunner::new("worker", TaskPolicy::Parallel)
        .spawn(&module, triggers, |ctx: TaskContext, job: &'static str| async move {
            match job {
                "bad" => return Err(HandlerError::failed("bad job")),
                "boom" => panic!("worker exploded"),
                _ => ctx.update("ok", json!(true)).await?,
            }
            Ok::<(), HandlerError>(())
        })
        .unwrap();

    for job in ["bad", "boom", "fine"] {
        tx.send(job).await.unwrap();
    }
    drop(tx);
    let stats = runner.join().await;

    assert_eq!(stats.failed, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(module.get("ok"), Some(json!(true)));

    let mut errors = errors.lock().unwrap().clone();
    errors.sort();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], ("worker".to_string(), "bad job".to_string()));
    assert_eq!(errors[1].1, "handler panicked: worker exploded");
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_latest_without_writes() {
    let module = running("m", json!({}));
    let (tx, triggers) = TriggerStream::channel(8);
    let runner = TaskRunner::new("slow", TaskPolicy::Latest)
        .spawn(&module, triggers, |ctx: TaskContext, _: ()| async move {
            ctx.sleep(Duration::from_secs(60)).await?;
            ctx.update("done", json!(true)).await?;
            Ok::<(), HandlerError>(())
        })
        .unwrap();

    tx.send(()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let stats = runner.stop().await;

    assert_eq!(stats.canceled, 1);
    assert_eq!(module.get("done"), None);
}

#[tokio::test]
async fn test_release_stops_runners() {
    let module = running("m", json!({}));
    let (_tx, triggers) = TriggerStream::<()>::channel(1);
    let runner = TaskRunner::new("idle", TaskPolicy::Task)
        .spawn(&module, triggers, |_ctx: TaskContext, _: ()| async move { Ok::<(), HandlerError>(()) })
        .unwrap();

    module.release();
    let stats = tokio::time::timeout(Duration::from_secs(5), runner.join()).await.unwrap();
    assert_eq!(stats.accepted, 0);

    let (_tx, triggers) = TriggerStream::<()>::channel(1);
    let refused = TaskRunner::new("late", TaskPolicy::Task)
        .spawn(&module, triggers, |_ctx: TaskContext, _: ()| async move { Ok::<(), HandlerError>(()) });
    assert!(matches!(refused, Err(ModuleError::Released { .. })));
}

#[tokio::test]
async fn test_action_and_selector_triggers() {
    let module = running("m", json!({"q": "", "echo": null}));
    let runner = TaskRunner::new("echo", TaskPolicy::Latest)
        .spawn(
            &module,
            module.watch(|state| state["q"].clone()),
            |ctx: TaskContext, q: Value| async move {
                ctx.update("echo", q).await?;
                Ok::<(), HandlerError>(())
            },
        )
        .unwrap();
    module.reducer("type", |txn, payload| {
        txn.update("q", payload.clone())?;
        Ok(())
    });

    module.dispatch(Action::new("type", json!("rust"))).await.unwrap();

    let mut state = module.watch_state();
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.borrow_and_update()["echo"] != json!("rust") {
            state.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    runner.stop().await;
}

#[tokio::test]
async fn test_lifecycle_success_and_failure_write_backs() {
    let module = running("orders", json!({}));
    let errors = Arc::new(AtomicUsize::new(0));
    {
        let errors = errors.clone();
        module.on_error(move |_, _| {
            errors.fetch_add(1, Ordering::SeqCst);
        });
    }

    let lifecycle = TaskLifecycle::new("submit", |_ctx: TaskContext, amount: i64| async move {
        if amount > 100 {
            Err(HandlerError::failed("limit exceeded"))
        } else {
            Ok(amount * 2)
        }
    })
    .on_pending(|txn, amount| {
        txn.update("status", json!("pending"))?;
        txn.update("requested", json!(amount))?;
        Ok(())
    })
    .on_success(|txn, confirmed| {
        txn.update("status", json!("confirmed"))?;
        txn.update("confirmed", json!(confirmed))?;
        Ok(())
    })
    .on_failure(|txn, message| {
        txn.update("status", json!("failed"))?;
        txn.update("error", json!(message))?;
        Ok(())
    });

    let (tx, triggers) = TriggerStream::channel(4);
    let runner = TaskRunner::new("submit", TaskPolicy::Parallel)
        .spawn(&module, triggers, lifecycle)
        .unwrap();

    tx.send(40).await.unwrap();
    let mut state = module.watch_state();
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.borrow_and_update()["status"] != json!("confirmed") {
            state.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    assert_eq!(module.get("confirmed"), Some(json!(80)));

    tx.send(500).await.unwrap();
    drop(tx);
    let stats = runner.join().await;

    assert_eq!(module.get("status"), Some(json!("failed")));
    assert_eq!(module.get("error"), Some(json!("limit exceeded")));
    assert_eq!(module.get("requested"), Some(json!(500)));
    assert_eq!(stats.completed, 2);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_lifecycle_never_writes_back() {
    let module = running("m", json!({}));
    let lifecycle = TaskLifecycle::new("lookup", |ctx: TaskContext, key: &'static str| async move {
        ctx.sleep(Duration::from_millis(50)).await?;
        Ok(key.to_uppercase())
    })
    .on_success(|txn, value| {
        txn.update("value", json!(value))?;
        Ok(())
    });

    let (tx, triggers) = TriggerStream::channel(4);
    let runner = TaskRunner::new("lookup", TaskPolicy::Latest)
        .spawn(&module, triggers, lifecycle)
        .unwrap();
    tx.send("a").await.unwrap();
    tx.send("b").await.unwrap();
    drop(tx);
    let stats = runner.join().await;

    assert_eq!(stats.canceled, 1);
    assert_eq!(module.get("value"), Some(json!("B")));
}
