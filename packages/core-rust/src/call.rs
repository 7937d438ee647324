use serde::{Deserialize, Serialize};

use crate::types::Value;

/// A decoded remote call.
///
/// Produced by the transport decoder and consumed exactly once by the
/// dispatcher. The argument list is positional, in IDL field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// Per-connection correlation number echoed back on the reply.
    pub seq_id: i32,
    /// Name of the IDL method being invoked.
    pub method: String,
    /// Decoded arguments in declaration order.
    pub args: Vec<Value>,
}

impl Call {
    #[must_use]
    pub fn new(seq_id: i32, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            seq_id,
            method: method.into(),
            args,
        }
    }
}
