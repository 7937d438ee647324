use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

thread_local! {
    static CURRENT: RefCell<Option<Arc<RequestContext>>> = const { RefCell::new(None) };
}

/// Per-request context carrying identity, deadline, and tracing information.
///
/// Created by the transport for each inbound call and made visible to method
/// implementations through [`RequestContext::current`] while the call runs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier of this request (UUID v4).
    pub request_id: String,
    /// Identifier of the server node handling this request.
    pub node_id: String,
    /// IDL method name of the call this context belongs to.
    pub method: String,
    /// Sequence id of the call this context belongs to.
    pub seq_id: i32,
    /// Distributed trace identifier, if the caller propagated one.
    pub trace_id: Option<String>,
    /// Point in time after which the caller no longer waits for a reply.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    /// Creates a context with a fresh request id and no deadline.
    #[must_use]
    pub fn new(node_id: impl Into<String>, method: impl Into<String>, seq_id: i32) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            node_id: node_id.into(),
            method: method.into(),
            seq_id,
            trace_id: None,
            deadline: None,
        }
    }

    /// Activates `ctx` on the current thread until the returned guard drops.
    ///
    /// Pushes nest: dropping the guard restores whichever context was active
    /// before, including none.
    #[must_use = "the context is deactivated as soon as the guard is dropped"]
    pub fn push(ctx: Arc<RequestContext>) -> ContextGuard {
        let previous = CURRENT.with(|cell| cell.replace(Some(ctx)));
        tracing::trace!("request context pushed");
        ContextGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Returns the context active on the current thread, if any.
    #[must_use]
    pub fn current() -> Option<Arc<RequestContext>> {
        CURRENT.with(|cell| cell.borrow().clone())
    }

    /// Whether the deadline, if any, has already passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Scope handle returned by [`RequestContext::push`].
///
/// Not `Send`: it must be dropped on the thread that pushed it.
pub struct ContextGuard {
    previous: Option<Arc<RequestContext>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|cell| *cell.borrow_mut() = previous);
        tracing::trace!("request context popped");
    }
}

impl std::fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard").finish_non_exhaustive()
    }
}
