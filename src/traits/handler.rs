use std::future::Future;

use async_trait::async_trait;

use crate::errors::HandlerError;
use crate::task::TaskContext;

/// User logic bound to a trigger stream by a task runner.
///
/// The context carries the invocation's cancellation token; every write made
/// through it is aborted if the invocation is canceled before commit.
#[async_trait]
pub trait TaskHandler<P>: Send + Sync
where
    P: Send + 'static,
{
    async fn handle(&self, ctx: TaskContext, payload: P) -> Result<(), HandlerError>;
}

#[async_trait]
impl<P, F, Fut> TaskHandler<P> for F
where
    P: Send + 'static,
    F: Fn(TaskContext, P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, ctx: TaskContext, payload: P) -> Result<(), HandlerError> {
        (self)(ctx, payload).await
    }
}
