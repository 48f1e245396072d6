// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::HandlerError;
use crate::task::TaskContext;
use crate::traits::TaskHandler;
use crate::transaction::{TransactionHandle, TxnOrigin};

type EffectFuture<T> = Pin<Box<dyn Future<Output = Result<T, HandlerError>> + Send>>;
type EffectFn<P, T> = Arc<dyn Fn(TaskContext, P) -> EffectFuture<T> + Send + Sync>;
type PendingFn<P> = Arc<dyn Fn(&mut TransactionHandle, &P) -> Result<(), HandlerError> + Send + Sync>;
type SuccessFn<T> = Arc<dyn Fn(&mut TransactionHandle, T) -> Result<(), HandlerError> + Send + Sync>;
type FailureFn = Arc<dyn Fn(&mut TransactionHandle, &str) -> Result<(), HandlerError> + Send + Sync>;

/// Pending write, async effect, then a success or failure write-back.
///
/// Each write is its own transaction. The effect runs outside any
/// transaction. A write-back is skipped when the invocation was canceled
/// or superseded by a newer `latest` occurrence, and interruption never
/// triggers the failure write-back. With a failure write-back installed,
/// an effect error counts as handled and does not reach the error hook.
pub struct TaskLifecycle<P, T> {
    name: Arc<str>,
    pending: Option<PendingFn<P>>,
    effect: EffectFn<P, T>,
    success: Option<SuccessFn<T>>,
    failure: Option<FailureFn>,
}

impl<P, T> TaskLifecycle<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    pub fn new<F, Fut>(name: &str, effect: F) -> Self
    where
        F: Fn(TaskContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, HandlerError>> + Send + 'static,
    {
        Self {
            name: Arc::from(name),
            pending: None,
            effect: Arc::new(move |ctx: TaskContext, payload: P| {
                Box::pin(effect(ctx, payload)) as EffectFuture<T>
            }),
            success: None,
            failure: None,
        }
    }

    pub fn on_pending<F>(mut self, write: F) -> Self
    where
        F: Fn(&mut TransactionHandle, &P) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.pending = Some(Arc::new(write));
        self
    }

    pub fn on_success<F>(mut self, write: F) -> Self
    where
        F: Fn(&mut TransactionHandle, T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.success = Some(Arc::new(write));
        self
    }

    pub fn on_failure<F>(mut self, write: F) -> Self
    where
        F: Fn(&mut TransactionHandle, &str) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.failure = Some(Arc::new(write));
        self
    }
}

#[async_trait]
impl<P, T> TaskHandler<P> for TaskLifecycle<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    async fn handle(&self, ctx: TaskContext, payload: P) -> Result<(), HandlerError> {
        if let Some(pending) = &self.pending {
            let pending = pending.clone();
            let input = payload.clone();
            ctx.transaction_as(TxnOrigin::task_pending(&self.name), move |txn| pending(txn, &input))
                .await?;
        }

        let result = (self.effect)(ctx.clone(), payload).await;
        if !ctx.is_current() {
            return Err(HandlerError::Canceled);
        }

        let origin = TxnOrigin::service_callback(&self.name);
        match result {
            Ok(value) => match &self.success {
                Some(success) => {
                    let success = success.clone();
                    ctx.transaction_as(origin, move |txn| success(txn, value)).await
                }
                None => Ok(()),
            },
            Err(error) if error.is_canceled() => Err(error),
            Err(error) => match &self.failure {
                Some(failure) => {
                    let failure = failure.clone();
                    let message = error.to_string();
                    tracing::debug!(task = %self.name, "effect failed, writing failure back: {}", message);
                    ctx.transaction_as(origin, move |txn| failure(txn, &message)).await
                }
                None => Err(error),
            },
        }
    }
}
