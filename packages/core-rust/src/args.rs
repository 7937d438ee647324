//! Argument schemas and the argument container built from a decoded call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Value, ValueType};

/// Single declared argument of an IDL method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Name of the argument as declared in the IDL.
    pub name: String,
    /// Expected value type. `Null` is always accepted for optional fields.
    pub ty: ValueType,
    /// Whether the argument must be present and non-null.
    pub required: bool,
}

impl FieldDef {
    #[must_use]
    pub fn required(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
        }
    }
}

/// Why a decoded argument list could not be turned into an [`Args`] container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("expected at most {expected} arguments, got {actual}")]
    TooMany { expected: usize, actual: usize },
    #[error("missing required argument '{field}'")]
    MissingRequired { field: String },
    #[error("argument '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: ValueType,
        actual: ValueType,
    },
}

/// Ordered argument declaration for one method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub fields: Vec<FieldDef>,
}

impl ArgSpec {
    #[must_use]
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// A method that takes no arguments.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates `values` against the declared fields and builds the container.
    ///
    /// Missing trailing optional fields are filled with `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns an [`ArgsError`] when there are more values than declared fields,
    /// a required field is missing or null, or a non-null value has the wrong type.
    pub fn build(&self, mut values: Vec<Value>) -> Result<Args, ArgsError> {
        if values.len() > self.fields.len() {
            return Err(ArgsError::TooMany {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        values.resize(self.fields.len(), Value::Null);

        for (field, value) in self.fields.iter().zip(&values) {
            if value.is_null() {
                if field.required {
                    return Err(ArgsError::MissingRequired {
                        field: field.name.clone(),
                    });
                }
                continue;
            }
            let actual = value.value_type();
            if actual != field.ty {
                return Err(ArgsError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.ty,
                    actual,
                });
            }
        }

        let names = self.fields.iter().map(|f| f.name.clone()).collect();
        Ok(Args { names, values })
    }
}

/// Validated argument container handed to a method implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    names: Vec<String>,
    values: Vec<Value>,
}

impl Args {
    /// Positional access.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Access by declared argument name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
