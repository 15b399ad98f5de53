//! Error types for `frami-core`.

use thiserror::Error;

use crate::{fanout::Signal, payload::ValidationErrors};

#[derive(Debug, Error)]
pub enum Error {
  /// A group table references a permission codename that does not exist.
  #[error("unknown permission codename: {0:?}")]
  UnknownPermission(String),

  #[error("group not found: {0:?}")]
  UnknownGroup(String),

  /// A polymorphic reference names a type outside the known target union.
  #[error("no registered target type: {0:?}")]
  UnregisteredTarget(String),

  #[error("unknown notification event: {0:?}")]
  UnknownEvent(String),

  /// A fan-out rule was attached to a signal that has no event kind.
  #[error("signal {0:?} does not map to a notification event")]
  UnknownSignal(Signal),

  #[error("attribute path {path:?} does not resolve on {model}")]
  BadPath { model: &'static str, path: String },

  #[error("column {column:?}: {reason}")]
  Column { column: String, reason: String },

  #[error("validation failed: {0}")]
  Validation(ValidationErrors),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl From<ValidationErrors> for Error {
  fn from(errors: ValidationErrors) -> Self { Self::Validation(errors) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
