//! The unit of work the queue drives. Usually a call to an external service.

use std::future::Future;
use std::sync::Arc;
use async_trait::async_trait;
use crate::queue::types::QueueItem;

#[async_trait]
pub trait Processor<P>: Send + Sync {
    /// `Err` (or a panic) counts as a failed attempt and goes through the retry policy.
    async fn process(&self, item: &QueueItem<P>) -> anyhow::Result<()>;
}

#[async_trait]
impl<P, T> Processor<P> for Arc<T>
where
    P: Send + Sync + 'static,
    T: Processor<P> + ?Sized,
{
    async fn process(&self, item: &QueueItem<P>) -> anyhow::Result<()> {
        (**self).process(item).await
    }
}

/// Adapts a closure returning a future.
pub struct FnProcessor<F>(pub F);

#[async_trait]
impl<P, F, Fut> Processor<P> for FnProcessor<F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(QueueItem<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn process(&self, item: &QueueItem<P>) -> anyhow::Result<()> {
        (self.0)(item.clone()).await
    }
}
