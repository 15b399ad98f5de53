//! Error type for `frami-store-sqlite`.

use frami_core::{payload::ValidationErrors, store::StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] frami_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A write referenced missing rows or broke a uniqueness rule.
  #[error("validation failed: {0}")]
  Validation(ValidationErrors),

  /// A save or delete addressed a row that no longer exists.
  #[error("{model} {id} not found")]
  NotFound { model: &'static str, id: i64 },

  #[error("unknown column {column:?} on {model}")]
  UnknownColumn { model: &'static str, column: String },
}

impl From<ValidationErrors> for Error {
  fn from(errors: ValidationErrors) -> Self { Self::Validation(errors) }
}

impl StoreError for Error {
  fn into_validation(self) -> Result<ValidationErrors, Self> {
    match self {
      Self::Validation(errors)
      | Self::Core(frami_core::Error::Validation(errors)) => Ok(errors),
      other => Err(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
