//! Call dispatch: resolves a `Call` against the registry and hands it to the
//! invocation strategy selected by the method's descriptor.

use std::convert::Infallible;
use std::future::{self, Ready};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};

use callwire_core::{Call, EventCounter, ReplyError, RequestContext, Value};
use tower::Service;
use tracing::{debug, warn};

use super::config::DispatcherConfig;
use super::descriptor::{Callable, MethodDescriptor};
use super::invoke::{self, panic_message};
use super::message::InboundCall;
use super::registry::MethodRegistry;
use super::reply::Reply;
use super::worker::BlockingPool;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Public entry point for serving decoded calls.
///
/// `serve` never blocks and never panics on behalf of user code: it always
/// returns a `Reply` that is either already settled or will be settled by the
/// invoker the method's descriptor selects.
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    pool: Arc<BlockingPool>,
    counter: Option<Arc<dyn EventCounter>>,
}

impl Dispatcher {
    /// Create a dispatcher with its own blocking pool sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker threads cannot be spawned.
    pub fn new(registry: MethodRegistry, config: &DispatcherConfig) -> std::io::Result<Self> {
        let pool = BlockingPool::from_config(config)?;
        Ok(Self::with_pool(Arc::new(registry), Arc::new(pool)))
    }

    /// Create a dispatcher that shares an existing registry and pool.
    #[must_use]
    pub fn with_pool(registry: Arc<MethodRegistry>, pool: Arc<BlockingPool>) -> Self {
        Self {
            registry,
            pool,
            counter: None,
        }
    }

    /// Report every settled reply to `counter`.
    #[must_use]
    pub fn with_event_counter(mut self, counter: Arc<dyn EventCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<BlockingPool> {
        &self.pool
    }

    /// Serve one call.
    ///
    /// Unknown methods yield an already-failed reply. Otherwise the reply is
    /// returned pending and settled later by the selected invoker.
    pub fn serve(&self, ctx: Arc<RequestContext>, call: Call) -> Reply {
        let Call {
            seq_id,
            method,
            args,
        } = call;

        let Some(descriptor) = self.registry.lookup(&method) else {
            warn!(seq_id, method = %method, "unknown method");
            return Reply::failed(
                seq_id,
                ReplyError::UnknownMethod { method },
                self.counter.clone(),
            );
        };

        debug!(seq_id, method = %method, mode = ?descriptor.mode(), "dispatching call");
        let reply = Reply::with_counter(seq_id, self.counter.clone());
        self.invoke(ctx, descriptor, args, &reply);
        reply
    }

    fn invoke(
        &self,
        ctx: Arc<RequestContext>,
        descriptor: &Arc<MethodDescriptor>,
        values: Vec<Value>,
        reply: &Reply,
    ) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let args = match descriptor.build_args(values) {
                Ok(args) => args,
                Err(err) => {
                    debug!(seq_id = reply.seq_id(), error = %err, "rejecting arguments");
                    reply.fail(err);
                    return;
                }
            };
            match descriptor.callable() {
                Callable::Blocking(method) => invoke::blocking::invoke(
                    &self.pool,
                    ctx,
                    Arc::clone(descriptor),
                    Arc::clone(method),
                    args,
                    reply,
                ),
                Callable::Async(method) => {
                    invoke::callback::invoke(Arc::clone(descriptor), method.as_ref(), args, reply);
                }
            }
        }));

        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            tracing::error!(method = descriptor.name(), %message, "dispatch panicked");
            reply.fail(ReplyError::Panicked {
                method: descriptor.name().to_string(),
                message,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchService
// ---------------------------------------------------------------------------

/// Tower adapter over a shared [`Dispatcher`], the innermost service of the
/// dispatch pipeline.
///
/// Always ready, and resolves as soon as the call has been handed off. The
/// returned [`Reply`] may still be pending.
#[derive(Clone)]
pub struct DispatchService {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchService {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Service<InboundCall> for DispatchService {
    type Response = Reply;
    type Error = Infallible;
    type Future = Ready<Result<Reply, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, inbound: InboundCall) -> Self::Future {
        future::ready(Ok(self.dispatcher.serve(inbound.ctx, inbound.call)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
