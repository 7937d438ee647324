//! Invocation strategies.
//!
//! - [`blocking`]: runs direct-return methods on the bounded worker pool
//! - [`callback`]: starts callback-driven methods on the calling thread

pub mod blocking;
pub mod callback;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use callwire_core::{ReplyError, Value};

pub use callback::MethodCallback;

use super::descriptor::MethodDescriptor;
use super::reply::Reply;

/// Settles `reply` with a successful raw result.
///
/// One-way methods always complete with the empty value; everything else goes
/// through the descriptor's result wrapping. A panicking result wrapper fails
/// the reply with `ReplyError::Panicked`.
pub(crate) fn complete_with_result(reply: &Reply, descriptor: &MethodDescriptor, raw: Value) {
    if descriptor.is_one_way() {
        reply.complete(None);
        return;
    }
    match panic::catch_unwind(AssertUnwindSafe(|| descriptor.wrap_result(raw))) {
        Ok(Ok(value)) => {
            reply.complete(value);
        }
        Ok(Err(err)) => {
            reply.fail(err);
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(method = descriptor.name(), %message, "result wrapping panicked");
            reply.fail(ReplyError::Panicked {
                method: descriptor.name().to_string(),
                message,
            });
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
