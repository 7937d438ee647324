//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`timeout`]: Per-call deadline enforcement on the reply
//! - [`metrics`]: Call timing and outcome via `tracing` spans and `metrics`
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`pipeline`]: Composes all layers into a single service stack
//!
//! Every layer speaks `Service<InboundCall, Response = Reply, Error = Infallible>`.
//! Failures travel on the reply, never as a service error.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use crate::service::reply::Reply;

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_dispatch_pipeline, DispatchPipeline};
pub use timeout::TimeoutLayer;

/// Boxed future returned by the middleware services.
pub type ReplyFuture = Pin<Box<dyn Future<Output = Result<Reply, Infallible>> + Send>>;

#[cfg(test)]
pub(crate) mod test_support {
    use std::convert::Infallible;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use callwire_core::{Call, Value};
    use tower::Service;

    use super::ReplyFuture;
    use crate::service::message::InboundCall;
    use crate::service::reply::Reply;

    /// Completes each reply with the call's method name after `delay_ms`.
    /// The returned future resolves immediately with the pending reply.
    #[derive(Clone)]
    pub struct SlowService {
        pub delay_ms: u64,
    }

    impl Service<InboundCall> for SlowService {
        type Response = Reply;
        type Error = Infallible;
        type Future = ReplyFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, inbound: InboundCall) -> Self::Future {
            let reply = Reply::pending(inbound.call.seq_id);
            let settle = reply.clone();
            let delay = self.delay_ms;
            let method = inbound.call.method;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                settle.complete(Some(Value::from(method)));
            });
            Box::pin(async move { Ok(reply) })
        }
    }

    pub fn inbound(seq_id: i32, timeout_ms: u64) -> InboundCall {
        InboundCall::new("test", Call::new(seq_id, "slow", vec![]), timeout_ms)
    }
}
