//! Error types for `shelf-core`.

use thiserror::Error;

use crate::schema::FieldType;

/// Raised by a [`Validator`](crate::promote::Validator) when a wrapped value
/// is not acceptable for the permanent table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", .field.as_deref().unwrap_or("record"))]
pub struct ValidationError {
  /// The offending field, or `None` for record-level failures.
  pub field:   Option<String>,
  pub message: String,
}

impl ValidationError {
  pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self { field: Some(field.into()), message: message.into() }
  }

  pub fn record(message: impl Into<String>) -> Self {
    Self { field: None, message: message.into() }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// The target schema holds a field kind that cannot be staged. Derivation
  /// is aborted entirely.
  #[error("field {schema}.{field} is many-to-many and cannot be staged")]
  UnsupportedFieldKind { schema: String, field: String },

  #[error("invalid schema {schema}: {reason}")]
  InvalidSchema { schema: String, reason: String },

  #[error("field {schema}.{field} clashes with a staging bookkeeping column")]
  ReservedFieldName { schema: String, field: String },

  #[error("staging schema {name:?} is already registered for table {table}")]
  AlreadyRegistered { table: String, name: String },

  #[error("unknown field {field:?} on {schema}")]
  UnknownField { schema: String, field: String },

  #[error("field {field:?} expects a {expected} value")]
  TypeMismatch { field: String, expected: FieldType },

  #[error("configuration error: {0}")]
  Configuration(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("unsupported operation: {0}")]
  UnsupportedOperation(String),

  #[error("validation failed: {0}")]
  Validation(#[from] ValidationError),

  #[error("integrity error: {0}")]
  Integrity(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
