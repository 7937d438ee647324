//! Single-assignment reply cell shared between the dispatcher, the invokers,
//! and any timeout or cancellation watcher.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use callwire_core::{EventCounter, ReplyError, ReplyOutcome, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Observable state of a [`Reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    Pending,
    Succeeded,
    Failed,
}

struct Inner {
    seq_id: i32,
    outcome: OnceLock<ReplyOutcome>,
    settled: Notify,
    counter: Option<Arc<dyn EventCounter>>,
}

/// Eventual result of one call, correlated by sequence id.
///
/// Cloning yields another handle to the same cell. The first `complete` or
/// `fail` wins; every later attempt is a no-op that returns `false`.
#[derive(Clone)]
pub struct Reply {
    inner: Arc<Inner>,
}

impl Reply {
    /// Creates a pending reply.
    #[must_use]
    pub fn pending(seq_id: i32) -> Self {
        Self::with_counter(seq_id, None)
    }

    /// Creates a pending reply that reports its settlement to `counter`.
    #[must_use]
    pub fn with_counter(seq_id: i32, counter: Option<Arc<dyn EventCounter>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                seq_id,
                outcome: OnceLock::new(),
                settled: Notify::new(),
                counter,
            }),
        }
    }

    /// Creates a reply that is already failed.
    #[must_use]
    pub fn failed(
        seq_id: i32,
        err: ReplyError,
        counter: Option<Arc<dyn EventCounter>>,
    ) -> Self {
        let reply = Self::with_counter(seq_id, counter);
        reply.fail(err);
        reply
    }

    #[must_use]
    pub fn seq_id(&self) -> i32 {
        self.inner.seq_id
    }

    /// Whether the reply has reached a terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    #[must_use]
    pub fn state(&self) -> ReplyState {
        match self.inner.outcome.get() {
            None => ReplyState::Pending,
            Some(Ok(_)) => ReplyState::Succeeded,
            Some(Err(_)) => ReplyState::Failed,
        }
    }

    /// Settles the reply successfully. `None` is the empty value.
    ///
    /// Returns `true` if this call settled the reply.
    pub fn complete(&self, value: Option<Value>) -> bool {
        self.settle(Ok(value))
    }

    /// Settles the reply as failed.
    ///
    /// Returns `true` if this call settled the reply.
    pub fn fail(&self, err: ReplyError) -> bool {
        self.settle(Err(err))
    }

    /// Returns the terminal outcome without waiting.
    #[must_use]
    pub fn outcome(&self) -> Option<ReplyOutcome> {
        self.inner.outcome.get().cloned()
    }

    /// Waits until the reply is settled and returns its outcome.
    pub async fn settled(&self) -> ReplyOutcome {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            // Register before checking so a settle in between still wakes us.
            notified.as_mut().enable();
            if let Some(outcome) = self.inner.outcome.get() {
                return outcome.clone();
            }
            notified.await;
        }
    }

    /// Fails the reply with [`ReplyError::Timeout`] once `after` elapses,
    /// unless it has settled by then.
    ///
    /// Must be called from within a tokio runtime.
    pub fn expire_after(&self, after: Duration) -> JoinHandle<()> {
        let reply = self.clone();
        tokio::spawn(async move {
            if tokio::time::timeout(after, reply.settled()).await.is_err() {
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = after.as_millis() as u64;
                if reply.fail(ReplyError::Timeout { timeout_ms }) {
                    warn!(seq_id = reply.seq_id(), timeout_ms, "reply timed out");
                }
            }
        })
    }

    fn settle(&self, outcome: ReplyOutcome) -> bool {
        let success = outcome.is_ok();
        if self.inner.outcome.set(outcome).is_err() {
            trace!(seq_id = self.inner.seq_id, "late completion ignored");
            return false;
        }
        if let Some(counter) = &self.inner.counter {
            if success {
                counter.on_success();
            } else {
                counter.on_failure();
            }
        }
        self.inner.settled.notify_waiters();
        true
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("seq_id", &self.inner.seq_id)
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use callwire_core::{CumulativeEventCounter, EventCount};
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn starts_pending() {
        let reply = Reply::pending(3);
        assert_eq!(reply.seq_id(), 3);
        assert_eq!(reply.state(), ReplyState::Pending);
        assert!(!reply.is_done());
        assert!(reply.outcome().is_none());
    }

    #[test]
    fn first_completion_wins() {
        let reply = Reply::pending(1);
        assert!(reply.complete(Some(Value::from("first"))));
        assert!(!reply.complete(Some(Value::from("second"))));
        assert!(!reply.fail(ReplyError::Overloaded));
        assert_eq!(reply.state(), ReplyState::Succeeded);
        assert_eq!(reply.outcome().unwrap().unwrap(), Some(Value::from("first")));
    }

    #[test]
    fn failure_is_terminal() {
        let reply = Reply::pending(1);
        assert!(reply.fail(ReplyError::Timeout { timeout_ms: 10 }));
        assert!(!reply.complete(None));
        assert_eq!(reply.state(), ReplyState::Failed);
        assert!(matches!(
            reply.outcome().unwrap(),
            Err(ReplyError::Timeout { timeout_ms: 10 })
        ));
    }

    #[test]
    fn clones_share_the_cell() {
        let reply = Reply::pending(9);
        let other = reply.clone();
        other.complete(None);
        assert!(reply.is_done());
    }

    #[test]
    fn counter_sees_only_the_winning_completion() {
        let counter = Arc::new(CumulativeEventCounter::new());
        let reply = Reply::with_counter(1, Some(counter.clone()));
        reply.fail(ReplyError::Overloaded);
        reply.complete(None);
        reply.fail(ReplyError::Overloaded);
        assert_eq!(counter.count(), EventCount::new(0, 1));
    }

    #[test]
    fn failed_constructor_is_settled() {
        let reply = Reply::failed(
            8,
            ReplyError::UnknownMethod {
                method: "missing".to_string(),
            },
            None,
        );
        assert_eq!(reply.state(), ReplyState::Failed);
        assert_eq!(reply.seq_id(), 8);
    }

    #[test]
    fn concurrent_completions_settle_once() {
        let counter = Arc::new(CumulativeEventCounter::new());
        let reply = Reply::with_counter(1, Some(counter.clone()));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let reply = reply.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        reply.complete(Some(Value::Int(i)))
                    } else {
                        reply.fail(ReplyError::Overloaded)
                    }
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(counter.count().total(), 1);
    }

    #[tokio::test]
    async fn settled_waits_for_completion() {
        let reply = Reply::pending(1);
        let waiter = {
            let reply = reply.clone();
            tokio::spawn(async move { reply.settled().await })
        };
        tokio::task::yield_now().await;
        reply.complete(Some(Value::Int(5)));
        let outcome = waiter.await.unwrap();
        assert_eq!(outcome.unwrap(), Some(Value::Int(5)));
    }

    #[tokio::test]
    async fn settled_returns_immediately_when_done() {
        let reply = Reply::pending(1);
        reply.complete(None);
        assert_eq!(reply.settled().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_after_fails_pending_reply() {
        let reply = Reply::pending(1);
        reply.expire_after(Duration::from_millis(50)).await.unwrap();
        assert!(matches!(
            reply.outcome().unwrap(),
            Err(ReplyError::Timeout { timeout_ms: 50 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn expire_after_leaves_settled_reply_alone() {
        let reply = Reply::pending(1);
        let timer = reply.expire_after(Duration::from_millis(50));
        reply.complete(Some(Value::from("done")));
        timer.await.unwrap();
        assert_eq!(reply.state(), ReplyState::Succeeded);
    }

    proptest! {
        #[test]
        fn only_first_of_any_completion_sequence_sticks(
            attempts in proptest::collection::vec(any::<Option<i64>>(), 1..20)
        ) {
            let reply = Reply::pending(0);
            for attempt in &attempts {
                match attempt {
                    Some(v) => { reply.complete(Some(Value::Int(*v))); }
                    None => { reply.fail(ReplyError::Overloaded); }
                }
            }
            match attempts[0] {
                Some(v) => prop_assert_eq!(reply.outcome().unwrap().unwrap(), Some(Value::Int(v))),
                None => prop_assert_eq!(reply.state(), ReplyState::Failed),
            }
        }
    }
}
