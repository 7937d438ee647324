//! Reply error taxonomy.
//!
//! Every failure a reply can carry is one variant of [`ReplyError`], and every
//! variant maps onto a fixed protocol-level [`ApplicationErrorKind`] code so the
//! transport can encode it without inspecting user error types.

use std::sync::Arc;

use thiserror::Error;

use crate::args::ArgsError;

/// Protocol-level application exception codes (Thrift `TApplicationException`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationErrorKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceId,
    MissingResult,
    InternalError,
    ProtocolError,
    InvalidTransform,
    InvalidProtocol,
    UnsupportedClientType,
}

impl ApplicationErrorKind {
    /// Numeric code written on the wire.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::UnknownMethod => 1,
            Self::InvalidMessageType => 2,
            Self::WrongMethodName => 3,
            Self::BadSequenceId => 4,
            Self::MissingResult => 5,
            Self::InternalError => 6,
            Self::ProtocolError => 7,
            Self::InvalidTransform => 8,
            Self::InvalidProtocol => 9,
            Self::UnsupportedClientType => 10,
        }
    }

    /// Inverse of [`code`](Self::code). Unrecognised codes map to `Unknown`.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::UnknownMethod,
            2 => Self::InvalidMessageType,
            3 => Self::WrongMethodName,
            4 => Self::BadSequenceId,
            5 => Self::MissingResult,
            6 => Self::InternalError,
            7 => Self::ProtocolError,
            8 => Self::InvalidTransform,
            9 => Self::InvalidProtocol,
            10 => Self::UnsupportedClientType,
            _ => Self::Unknown,
        }
    }
}

/// Structured protocol error that a method implementation may raise itself.
///
/// Returned through `anyhow`, it is surfaced on the reply with its own kind
/// rather than as an internal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApplicationError {
    pub kind: ApplicationErrorKind,
    pub message: String,
}

impl ApplicationError {
    #[must_use]
    pub fn new(kind: ApplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Terminal failure of a reply.
#[derive(Debug, Clone, Error)]
pub enum ReplyError {
    #[error("unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments {
        method: String,
        #[source]
        reason: ArgsError,
    },

    #[error("{method} returned no result")]
    MissingResult { method: String },

    #[error("{method} failed: {cause}")]
    Handler {
        method: String,
        cause: Arc<anyhow::Error>,
    },

    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error("{method} panicked: {message}")]
    Panicked { method: String, message: String },

    #[error("call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("server overloaded, try again later")]
    Overloaded,

    #[error("{method} dropped its completion callback")]
    CallbackDropped { method: String },
}

impl ReplyError {
    /// Converts an error raised by a method implementation.
    ///
    /// An [`ApplicationError`] at the root of the chain keeps its own kind;
    /// anything else becomes [`ReplyError::Handler`].
    #[must_use]
    pub fn from_handler(method: &str, err: anyhow::Error) -> Self {
        match err.downcast::<ApplicationError>() {
            Ok(app) => Self::Application(app),
            Err(err) => Self::Handler {
                method: method.to_string(),
                cause: Arc::new(err),
            },
        }
    }

    /// Protocol code this error is encoded with.
    #[must_use]
    pub fn kind(&self) -> ApplicationErrorKind {
        match self {
            Self::UnknownMethod { .. } => ApplicationErrorKind::UnknownMethod,
            Self::InvalidArguments { .. } => ApplicationErrorKind::ProtocolError,
            Self::MissingResult { .. } | Self::CallbackDropped { .. } => {
                ApplicationErrorKind::MissingResult
            }
            Self::Application(app) => app.kind,
            Self::Handler { .. }
            | Self::Panicked { .. }
            | Self::Timeout { .. }
            | Self::Overloaded => ApplicationErrorKind::InternalError,
        }
    }

    /// Converts into the wire-level application exception.
    #[must_use]
    pub fn to_application_error(&self) -> ApplicationError {
        match self {
            Self::Application(app) => app.clone(),
            other => ApplicationError::new(other.kind(), other.to_string()),
        }
    }
}
