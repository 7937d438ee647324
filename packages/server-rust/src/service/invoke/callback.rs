//! Callback-driven invocation on the calling thread.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use callwire_core::{Args, ReplyError, Value};
use parking_lot::Mutex;
use tracing::warn;

use super::{complete_with_result, panic_message};
use crate::service::descriptor::{AsyncMethod, MethodDescriptor};
use crate::service::reply::Reply;

/// Where the invoker is relative to `AsyncMethod::start` returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartPhase {
    Starting,
    /// The callback was dropped unfired before `start` returned.
    DroppedWhileStarting,
    Started,
}

/// One-shot completion handle passed to an [`AsyncMethod`].
///
/// Consumed by whichever of `on_complete` or `on_error` fires first. Dropping it
/// unfired fails the reply with `ReplyError::CallbackDropped`.
pub struct MethodCallback {
    reply: Option<Reply>,
    descriptor: Arc<MethodDescriptor>,
    phase: Arc<Mutex<StartPhase>>,
}

impl MethodCallback {
    fn new(descriptor: Arc<MethodDescriptor>, reply: Reply, phase: Arc<Mutex<StartPhase>>) -> Self {
        Self {
            reply: Some(reply),
            descriptor,
            phase,
        }
    }

    /// Completes the call with the method's raw result.
    pub fn on_complete(mut self, value: Value) {
        if let Some(reply) = self.reply.take() {
            complete_with_result(&reply, &self.descriptor, value);
        }
    }

    /// Fails the call.
    pub fn on_error(mut self, err: anyhow::Error) {
        if let Some(reply) = self.reply.take() {
            reply.fail(ReplyError::from_handler(self.descriptor.name(), err));
        }
    }

    /// Whether the reply was already settled elsewhere, e.g. by a timeout.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reply.as_ref().is_none_or(Reply::is_done)
    }
}

impl Drop for MethodCallback {
    fn drop(&mut self) {
        let Some(reply) = self.reply.take() else {
            return;
        };
        {
            let mut phase = self.phase.lock();
            if *phase == StartPhase::Starting {
                // Let the invoker decide once `start` has returned.
                *phase = StartPhase::DroppedWhileStarting;
                return;
            }
        }
        if reply.fail(ReplyError::CallbackDropped {
            method: self.descriptor.name().to_string(),
        }) {
            warn!(
                seq_id = reply.seq_id(),
                method = self.descriptor.name(),
                "completion callback dropped without firing"
            );
        }
    }
}

impl fmt::Debug for MethodCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCallback")
            .field("method", &self.descriptor.name())
            .field("fired", &self.reply.is_none())
            .finish()
    }
}

/// Starts a callback-driven method on the calling thread.
///
/// No pre-settled check is made here: once started, the implementation runs to
/// its own callback and the reply's single assignment discards late results.
pub(crate) fn invoke(
    descriptor: Arc<MethodDescriptor>,
    method: &dyn AsyncMethod,
    args: Args,
    reply: &Reply,
) {
    let phase = Arc::new(Mutex::new(StartPhase::Starting));
    let callback = MethodCallback::new(Arc::clone(&descriptor), reply.clone(), Arc::clone(&phase));

    let started = panic::catch_unwind(AssertUnwindSafe(|| method.start(args, callback)));
    let dropped_early = {
        let mut phase = phase.lock();
        let previous = *phase;
        *phase = StartPhase::Started;
        previous == StartPhase::DroppedWhileStarting
    };

    match started {
        Ok(Ok(())) => {
            if dropped_early {
                warn!(
                    seq_id = reply.seq_id(),
                    method = descriptor.name(),
                    "completion callback dropped during start"
                );
                reply.fail(ReplyError::CallbackDropped {
                    method: descriptor.name().to_string(),
                });
            }
        }
        Ok(Err(err)) => {
            reply.fail(ReplyError::from_handler(descriptor.name(), err));
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(method = descriptor.name(), %message, "method panicked during start");
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

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use callwire_core::{ApplicationErrorKind, ValueType};

    use super::*;
    use crate::service::descriptor::{spawn_async, Callable};

    fn run(desc: MethodDescriptor, reply: &Reply) {
        let args = desc.build_args(vec![]).unwrap();
        let Callable::Async(method) = desc.callable().clone() else {
            panic!("expected an async method");
        };
        invoke(Arc::new(desc), method.as_ref(), args, reply);
    }

    #[test]
    fn start_runs_on_the_calling_thread() {
        let caller = thread::current().id();
        let desc = MethodDescriptor::callback("inline", move |_args: Args, cb: MethodCallback| {
            assert_eq!(thread::current().id(), caller);
            cb.on_complete(Value::from("ok"));
            Ok(())
        })
        .returns(ValueType::String);
        let reply = Reply::pending(1);
        run(desc, &reply);
        assert_eq!(reply.outcome().unwrap().unwrap(), Some(Value::from("ok")));
    }

    #[test]
    fn completion_from_another_thread_settles_reply() {
        let desc = MethodDescriptor::callback("later", |_args: Args, cb: MethodCallback| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                cb.on_complete(Value::Int(5));
            });
            Ok(())
        })
        .returns(ValueType::Int);
        let reply = Reply::pending(1);
        run(desc, &reply);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !reply.is_done() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(reply.outcome().unwrap().unwrap(), Some(Value::Int(5)));
    }

    #[test]
    fn one_way_success_is_empty() {
        let desc = MethodDescriptor::callback("fire", |_args: Args, cb: MethodCallback| {
            cb.on_complete(Value::from("ignored"));
            Ok(())
        })
        .returns(ValueType::String)
        .one_way();
        let reply = Reply::pending(1);
        run(desc, &reply);
        assert_eq!(reply.outcome().unwrap().unwrap(), None);
    }

    #[test]
    fn on_error_fails_reply() {
        let desc = MethodDescriptor::callback("bad", |_args: Args, cb: MethodCallback| {
            cb.on_error(anyhow::anyhow!("backend down"));
            Ok(())
        });
        let reply = Reply::pending(1);
        run(desc, &reply);
        let err = reply.outcome().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "bad failed: backend down");
    }

    #[test]
    fn start_error_wins_over_dropped_callback() {
        let desc = MethodDescriptor::callback("refuse", |_args: Args, cb: MethodCallback| {
            drop(cb);
            anyhow::bail!("cannot start")
        });
        let reply = Reply::pending(1);
        run(desc, &reply);
        let err = reply.outcome().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "refuse failed: cannot start");
    }

    #[test]
    fn callback_dropped_during_start_fails_reply() {
        let desc = MethodDescriptor::callback("forgetful", |_args: Args, cb: MethodCallback| {
            drop(cb);
            Ok(())
        });
        let reply = Reply::pending(1);
        run(desc, &reply);
        let err = reply.outcome().unwrap().unwrap_err();
        assert!(matches!(err, ReplyError::CallbackDropped { .. }));
        assert_eq!(err.kind(), ApplicationErrorKind::MissingResult);
    }

    #[test]
    fn callback_dropped_after_start_fails_reply() {
        let desc = MethodDescriptor::callback("lost", |_args: Args, cb: MethodCallback| {
            thread::spawn(move || drop(cb));
            Ok(())
        });
        let reply = Reply::pending(1);
        run(desc, &reply);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !reply.is_done() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(
            reply.outcome().unwrap(),
            Err(ReplyError::CallbackDropped { .. })
        ));
    }

    #[test]
    fn panicking_wrapper_off_thread_fails_reply() {
        let desc = MethodDescriptor::callback("odd", |_args: Args, cb: MethodCallback| {
            thread::spawn(move || cb.on_complete(Value::Null));
            Ok(())
        })
        .with_result_wrapper(|_name: &str, _raw: Value| panic!("wrapper exploded"));
        let reply = Reply::pending(1);
        run(desc, &reply);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !reply.is_done() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(
            reply.outcome(),
            Some(Err(ReplyError::Panicked { ref message, .. })) if message == "wrapper exploded"
        ));
    }

    #[test]
    fn panic_in_start_fails_reply() {
        let desc = MethodDescriptor::callback("boom", |_args: Args, _cb: MethodCallback| {
            panic!("start exploded")
        });
        let reply = Reply::pending(1);
        run(desc, &reply);
        assert!(matches!(
            reply.outcome().unwrap(),
            Err(ReplyError::Panicked { ref message, .. }) if message == "start exploded"
        ));
    }

    #[test]
    fn late_completion_after_timeout_is_ignored() {
        let (tx, rx) = std::sync::mpsc::channel::<MethodCallback>();
        let tx = Mutex::new(tx);
        let desc = MethodDescriptor::callback("slow", move |_args: Args, cb: MethodCallback| {
            tx.lock().send(cb).unwrap();
            Ok(())
        })
        .returns(ValueType::Int);
        let reply = Reply::pending(1);
        run(desc, &reply);

        reply.fail(ReplyError::Timeout { timeout_ms: 5 });
        let cb = rx.recv().unwrap();
        assert!(cb.is_cancelled());
        cb.on_complete(Value::Int(1));
        assert!(matches!(reply.outcome().unwrap(), Err(ReplyError::Timeout { .. })));
    }

    #[tokio::test]
    async fn spawn_async_completes_from_a_future() {
        let desc = MethodDescriptor::from_async(
            "add",
            spawn_async(|_args: Args| async {
                tokio::task::yield_now().await;
                Ok::<_, anyhow::Error>(Value::Int(3))
            }),
        )
        .returns(ValueType::Int);
        let reply = Reply::pending(1);
        run(desc, &reply);
        assert_eq!(reply.settled().await.unwrap(), Some(Value::Int(3)));
    }

    #[test]
    fn spawn_async_without_runtime_fails_reply() {
        let desc = MethodDescriptor::from_async(
            "add",
            spawn_async(|_args: Args| async { Ok::<_, anyhow::Error>(Value::Int(3)) }),
        );
        let reply = Reply::pending(1);
        run(desc, &reply);
        assert!(matches!(
            reply.outcome().unwrap(),
            Err(ReplyError::Handler { .. })
        ));
    }
}
