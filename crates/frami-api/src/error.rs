//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use frami_core::{access::Denied, payload::ValidationErrors, store::StoreError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Missing or invalid credentials.
  #[error("authentication required")]
  Unauthorized,

  #[error("permission denied")]
  Forbidden,

  #[error("not found")]
  NotFound,

  #[error("bad request: {0}")]
  BadRequest(String),

  /// Per-field problems with the request payload or query.
  #[error("validation failed: {0}")]
  Validation(ValidationErrors),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  /// Classify a store error: client mistakes become [`ApiError::Validation`],
  /// everything else is a server error.
  pub fn store<E: StoreError>(e: E) -> Self {
    match e.into_validation() {
      Ok(errors) => Self::Validation(errors),
      Err(e) => Self::Store(Box::new(e)),
    }
  }
}

impl From<Denied> for ApiError {
  fn from(denied: Denied) -> Self {
    match denied {
      Denied::Forbidden => Self::Forbidden,
      Denied::NotFound => Self::NotFound,
    }
  }
}

impl From<ValidationErrors> for ApiError {
  fn from(errors: ValidationErrors) -> Self { Self::Validation(errors) }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    Self::BadRequest(rejection.body_text())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::Unauthorized => {
        let body = Json(json!({ "error": self.to_string() }));
        return (
          StatusCode::UNAUTHORIZED,
          [(header::WWW_AUTHENTICATE, r#"Basic realm="frami""#)],
          body,
        )
          .into_response();
      }
      ApiError::Forbidden => (StatusCode::FORBIDDEN, json!({ "error": self.to_string() })),
      ApiError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": self.to_string() })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Validation(errors) => (
        StatusCode::BAD_REQUEST,
        serde_json::to_value(errors).unwrap_or_default(),
      ),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
      }
      ApiError::Internal(m) => {
        tracing::error!(error = %m, "internal failure");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": m }))
      }
    };
    (status, Json(body)).into_response()
  }
}
