//! Timeout middleware for calls.
//!
//! Fails replies that are still pending after `call_timeout_ms` with
//! `ReplyError::Timeout`. The method keeps running; its late result is dropped
//! by the reply's single assignment.

use std::convert::Infallible;
use std::task::{Context, Poll};
use std::time::Duration;

use callwire_core::ReplyError;
use tower::{Layer, Service};
use tracing::warn;

use super::ReplyFuture;
use crate::service::message::InboundCall;
use crate::service::reply::Reply;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps services with per-call timeout enforcement.
///
/// The timeout is read from each call's `call_timeout_ms` field, allowing
/// different calls to have different timeouts. A value of 0 disables it.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces per-call timeouts.
///
/// Its future resolves once the reply has settled, either by the method or by
/// the timeout.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<InboundCall> for TimeoutService<S>
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
        let timeout_ms = inbound.call_timeout_ms;
        let fut = self.inner.call(inbound);
        Box::pin(async move {
            let reply = fut.await?;
            if timeout_ms == 0 {
                reply.settled().await;
                return Ok(reply);
            }
            let duration = Duration::from_millis(timeout_ms);
            if tokio::time::timeout(duration, reply.settled()).await.is_err()
                && reply.fail(ReplyError::Timeout { timeout_ms })
            {
                warn!(seq_id = reply.seq_id(), timeout_ms, "call timed out");
            }
            Ok(reply)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
