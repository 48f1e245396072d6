use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

/// Async backing store for a `source` trait.
#[async_trait]
pub trait Resource: Send + Sync {
    async fn load(&self, key: Value) -> anyhow::Result<Value>;
}

/// [`Resource`] backed by an async closure.
pub struct FnResource<F> {
    load: F,
}

/// Wraps `|key| async move { ... }` as a [`Resource`].
pub fn resource_fn<F, Fut>(load: F) -> FnResource<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    FnResource { load }
}

#[async_trait]
impl<F, Fut> Resource for FnResource<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn load(&self, key: Value) -> anyhow::Result<Value> {
        (self.load)(key).await
    }
}
