//! Synchronous invocation on the blocking worker pool.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use callwire_core::{Args, ReplyError, RequestContext, Value};
use tracing::{debug, warn};

use super::{complete_with_result, panic_message};
use crate::service::descriptor::{BlockingMethod, MethodDescriptor};
use crate::service::reply::Reply;
use crate::service::worker::BlockingPool;

/// Schedules a blocking method call on `pool` and settles `reply` from the
/// worker thread.
///
/// If the call cannot be scheduled the reply fails with
/// `ReplyError::Overloaded`.
pub(crate) fn invoke(
    pool: &BlockingPool,
    ctx: Arc<RequestContext>,
    descriptor: Arc<MethodDescriptor>,
    method: Arc<dyn BlockingMethod>,
    args: Args,
    reply: &Reply,
) {
    let task_reply = reply.clone();
    let scheduled = pool.execute(move || run(ctx, &descriptor, method.as_ref(), args, &task_reply));
    if let Err(err) = scheduled {
        warn!(seq_id = reply.seq_id(), error = %err, "rejecting blocking call");
        reply.fail(ReplyError::Overloaded);
    }
}

fn run(
    ctx: Arc<RequestContext>,
    descriptor: &MethodDescriptor,
    method: &dyn BlockingMethod,
    args: Args,
    reply: &Reply,
) {
    if reply.is_done() {
        // Settled already, most likely by a timeout.
        debug!(
            seq_id = reply.seq_id(),
            method = descriptor.name(),
            "reply already settled, skipping call"
        );
        return;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<Value> {
        let _scope = RequestContext::push(ctx);
        method.call(args)
    }));

    match result {
        Ok(Ok(raw)) => complete_with_result(reply, descriptor, raw),
        Ok(Err(err)) => {
            reply.fail(ReplyError::from_handler(descriptor.name(), err));
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(method = descriptor.name(), %message, "method panicked");
            reply.fail(ReplyError::Panicked {
                method: descriptor.name().to_string(),
                message,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
