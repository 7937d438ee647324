//! `callwire` core: call/reply data model, argument schemas, request context,
//! and outcome event counting.

pub mod args;
pub mod call;
pub mod context;
pub mod error;
pub mod event_counter;
pub mod types;

pub use args::{ArgSpec, Args, ArgsError, FieldDef};
pub use call::Call;
pub use context::{ContextGuard, RequestContext};
pub use error::{ApplicationError, ApplicationErrorKind, ReplyError};
pub use event_counter::{CumulativeEventCounter, EventCount, EventCounter};
pub use types::{Value, ValueType};

/// Terminal outcome of a reply. `Ok(None)` is the empty value of a one-way call.
pub type ReplyOutcome = Result<Option<Value>, ReplyError>;
