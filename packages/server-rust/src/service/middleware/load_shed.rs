//! Load-shedding middleware for calls.
//!
//! Rejects calls when the server is overloaded (in-flight count reaches
//! `max_concurrent_calls`) with an already-failed reply carrying
//! `ReplyError::Overloaded`.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use callwire_core::ReplyError;
use tokio::sync::Semaphore;
use tower::{Layer, Service};
use tracing::debug;

use super::ReplyFuture;
use crate::service::message::InboundCall;
use crate::service::reply::Reply;

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent calls via a semaphore.
///
/// When all permits are taken, incoming calls are rejected immediately rather
/// than queued.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
    /// Create a new `LoadShedLayer` with the given concurrency limit.
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            semaphore: self.semaphore.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces a concurrency limit via semaphore-based backpressure.
#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<InboundCall> for LoadShedService<S>
where
    S: Service<InboundCall, Response = Reply, Error = Infallible> + Send,
    S::Future: Send + 'static,
{
    type Response = Reply;
    type Error = Infallible;
    type Future = ReplyFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, inbound: InboundCall) -> Self::Future {
        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            debug!(seq_id = inbound.call.seq_id, method = %inbound.call.method, "shedding call");
            let reply = Reply::failed(inbound.call.seq_id, ReplyError::Overloaded, None);
            return Box::pin(async move { Ok(reply) });
        };

        let fut = self.inner.call(inbound);
        Box::pin(async move {
            // The permit is held until the reply settles, not just until hand-off.
            let reply = fut.await?;
            reply.settled().await;
            drop(permit);
            Ok(reply)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::test_support::{inbound, SlowService};
    use crate::service::reply::ReplyState;

    #[tokio::test]
    async fn allows_calls_under_limit() {
        let svc = LoadShedLayer::new(10).layer(SlowService { delay_ms: 1 });
        let reply = svc.oneshot(inbound(1, 0)).await.unwrap();
        assert_eq!(reply.state(), ReplyState::Succeeded);
    }

    #[tokio::test]
    async fn rejects_when_overloaded() {
        let mut svc = LoadShedLayer::new(1).layer(SlowService { delay_ms: 500 });

        // First call acquires the single permit.
        let _ = ServiceExt::ready(&mut svc).await.unwrap();
        let in_flight = tokio::spawn(svc.call(inbound(1, 0)));

        // Give the spawned task time to take the permit.
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Second call should be rejected immediately.
        let reply = svc.call(inbound(2, 0)).await.unwrap();
        assert_eq!(reply.seq_id(), 2);
        assert!(matches!(reply.outcome().unwrap(), Err(ReplyError::Overloaded)));

        let first = in_flight.await.unwrap().unwrap();
        assert_eq!(first.state(), ReplyState::Succeeded);
    }

    #[tokio::test]
    async fn permit_is_released_after_settlement() {
        let mut svc = LoadShedLayer::new(1).layer(SlowService { delay_ms: 1 });
        let first = svc.call(inbound(1, 0)).await.unwrap();
        assert_eq!(first.state(), ReplyState::Succeeded);
        let second = svc.call(inbound(2, 0)).await.unwrap();
        assert_eq!(second.state(), ReplyState::Succeeded);
    }
}
