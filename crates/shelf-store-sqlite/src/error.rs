//! Error type for `shelf-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] shelf_core::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),

  /// A stored column could not be read back as its declared type.
  #[error("decode error: {0}")]
  Decode(String),
}

impl Error {
  /// The core error kind, if this is one.
  pub fn as_core(&self) -> Option<&shelf_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

/// Constraint violations surface as [`shelf_core::Error::Integrity`]; every
/// other SQLite failure is a database error.
impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    match e {
      rusqlite::Error::SqliteFailure(failure, message)
        if failure.code == ErrorCode::ConstraintViolation =>
      {
        Self::Core(shelf_core::Error::Integrity(
          message.unwrap_or_else(|| failure.to_string()),
        ))
      }
      other => Self::Database(tokio_rusqlite::Error::Rusqlite(other)),
    }
  }
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(e: tokio_rusqlite::Error) -> Self {
    match e {
      tokio_rusqlite::Error::Rusqlite(inner) => inner.into(),
      other => Self::Database(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
