//! Per-method metadata and the two callable forms a method can take.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use callwire_core::{
    ApplicationError, ApplicationErrorKind, ArgSpec, Args, ReplyError, Value, ValueType,
};

use super::invoke::MethodCallback;

// ---------------------------------------------------------------------------
// Callable forms
// ---------------------------------------------------------------------------

/// A method implementation that returns its result directly and may block.
///
/// Runs on the blocking worker pool.
pub trait BlockingMethod: Send + Sync + 'static {
    /// Invoke the method.
    ///
    /// # Errors
    ///
    /// Any error fails the reply. Return an [`ApplicationError`] to choose the
    /// protocol error kind.
    fn call(&self, args: Args) -> anyhow::Result<Value>;
}

impl<F> BlockingMethod for F
where
    F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn call(&self, args: Args) -> anyhow::Result<Value> {
        self(args)
    }
}

/// A callback-driven method implementation.
///
/// `start` runs on the calling thread and must not block; the implementation
/// hands its work elsewhere and later fires exactly one of
/// [`MethodCallback::on_complete`] or [`MethodCallback::on_error`].
pub trait AsyncMethod: Send + Sync + 'static {
    /// Begin the call.
    ///
    /// # Errors
    ///
    /// An error fails the reply immediately; the callback is then ignored.
    fn start(&self, args: Args, callback: MethodCallback) -> anyhow::Result<()>;
}

impl<F> AsyncMethod for F
where
    F: Fn(Args, MethodCallback) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn start(&self, args: Args, callback: MethodCallback) -> anyhow::Result<()> {
        self(args, callback)
    }
}

/// Adapter that runs an `async fn(Args) -> anyhow::Result<Value>` as an
/// [`AsyncMethod`] on the current tokio runtime. See [`spawn_async`].
pub struct SpawnAsync<F>(F);

/// Wraps an async function so each call is spawned onto the current tokio
/// runtime and completes its callback with the future's output.
pub fn spawn_async<F, Fut>(f: F) -> SpawnAsync<F>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    SpawnAsync(f)
}

impl<F, Fut> AsyncMethod for SpawnAsync<F>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn start(&self, args: Args, callback: MethodCallback) -> anyhow::Result<()> {
        let handle = tokio::runtime::Handle::try_current()?;
        let fut = (self.0)(args);
        handle.spawn(async move {
            match fut.await {
                Ok(value) => callback.on_complete(value),
                Err(err) => callback.on_error(err),
            }
        });
        Ok(())
    }
}

/// The underlying callable of a method.
#[derive(Clone)]
pub enum Callable {
    Blocking(Arc<dyn BlockingMethod>),
    Async(Arc<dyn AsyncMethod>),
}

/// Execution strategy selected by a method's callable form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodMode {
    Sync,
    Async,
}

/// Maps a raw method result into the reply value.
pub type ResultWrapper =
    Arc<dyn Fn(&str, Value) -> Result<Option<Value>, ReplyError> + Send + Sync>;

// ---------------------------------------------------------------------------
// MethodDescriptor
// ---------------------------------------------------------------------------

/// Immutable metadata for one IDL method.
///
/// Shared read-only across all concurrent calls to the method.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    one_way: bool,
    args: ArgSpec,
    returns: Option<ValueType>,
    wrapper: Option<ResultWrapper>,
    callable: Callable,
}

impl MethodDescriptor {
    /// Describes a method whose implementation returns directly.
    pub fn blocking<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::from_blocking(name, f)
    }

    /// Describes a callback-driven method.
    pub fn callback<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args, MethodCallback) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_async(name, f)
    }

    /// Describes a method backed by any [`BlockingMethod`] implementation.
    pub fn from_blocking(name: impl Into<String>, method: impl BlockingMethod) -> Self {
        Self::with_callable(name.into(), Callable::Blocking(Arc::new(method)))
    }

    /// Describes a method backed by any [`AsyncMethod`] implementation.
    pub fn from_async(name: impl Into<String>, method: impl AsyncMethod) -> Self {
        Self::with_callable(name.into(), Callable::Async(Arc::new(method)))
    }

    fn with_callable(name: String, callable: Callable) -> Self {
        Self {
            name,
            one_way: false,
            args: ArgSpec::empty(),
            returns: None,
            wrapper: None,
            callable,
        }
    }

    /// Declares the method's arguments.
    #[must_use]
    pub fn args(mut self, args: ArgSpec) -> Self {
        self.args = args;
        self
    }

    /// Declares the method's return type. Without it the method is `void`.
    #[must_use]
    pub fn returns(mut self, ty: ValueType) -> Self {
        self.returns = Some(ty);
        self
    }

    /// Marks the method fire-and-forget.
    #[must_use]
    pub fn one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    /// Replaces the default result wrapping derived from the return type.
    #[must_use]
    pub fn with_result_wrapper<W>(mut self, wrapper: W) -> Self
    where
        W: Fn(&str, Value) -> Result<Option<Value>, ReplyError> + Send + Sync + 'static,
    {
        self.wrapper = Some(Arc::new(wrapper));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_one_way(&self) -> bool {
        self.one_way
    }

    #[must_use]
    pub fn mode(&self) -> MethodMode {
        match self.callable {
            Callable::Blocking(_) => MethodMode::Sync,
            Callable::Async(_) => MethodMode::Async,
        }
    }

    #[must_use]
    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    #[must_use]
    pub fn arg_spec(&self) -> &ArgSpec {
        &self.args
    }

    /// Builds the argument container from decoded call arguments.
    ///
    /// # Errors
    ///
    /// Returns `ReplyError::InvalidArguments` if the values do not match the
    /// declared arguments.
    pub fn build_args(&self, values: Vec<Value>) -> Result<Args, ReplyError> {
        self.args
            .build(values)
            .map_err(|reason| ReplyError::InvalidArguments {
                method: self.name.clone(),
                reason,
            })
    }

    /// Maps a raw result into the reply value.
    ///
    /// Without a custom wrapper, `void` methods yield the empty value and typed
    /// methods must return a non-null value of the declared type.
    ///
    /// # Errors
    ///
    /// Returns `ReplyError::MissingResult` for a null result of a typed method,
    /// or an internal application error for a result of the wrong type.
    pub fn wrap_result(&self, raw: Value) -> Result<Option<Value>, ReplyError> {
        if let Some(wrapper) = &self.wrapper {
            return wrapper(&self.name, raw);
        }
        let Some(expected) = self.returns else {
            return Ok(None);
        };
        if raw.is_null() {
            return Err(ReplyError::MissingResult {
                method: self.name.clone(),
            });
        }
        let actual = raw.value_type();
        if actual != expected {
            return Err(ApplicationError::new(
                ApplicationErrorKind::InternalError,
                format!("{} returned {actual}, expected {expected}", self.name),
            )
            .into());
        }
        Ok(Some(raw))
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("mode", &self.mode())
            .field("one_way", &self.one_way)
            .field("args", &self.args)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
