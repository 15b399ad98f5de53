//! HTTP Basic-auth extractor resolving the caller to a [`Principal`].

use argon2::{PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use frami_core::{access::Principal, store::PortalStore};

use crate::{AppState, error::ApiError};

/// Present in a handler means the request carried valid credentials.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

/// Split an `Authorization: Basic …` header into username and password.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let encoded = value.strip_prefix("Basic ")?;
  let decoded = B64.decode(encoded.trim()).ok()?;
  let creds = String::from_utf8(decoded).ok()?;
  let (username, password) = creds.split_once(':')?;
  Some((username.to_owned(), password.to_owned()))
}

/// Verify the request's credentials against the store.
pub async fn authenticate<S: PortalStore>(
  headers: &HeaderMap,
  state: &AppState<S>,
) -> Result<Principal, ApiError> {
  let (username, password) =
    basic_credentials(headers).ok_or(ApiError::Unauthorized)?;

  let Some(creds) = state
    .store
    .credentials(username.clone())
    .await
    .map_err(ApiError::store)?
  else {
    tracing::warn!(user = %username, "unknown user");
    return Err(ApiError::Unauthorized);
  };

  let verified = PasswordHash::new(&creds.password_hash).is_ok_and(|hash| {
    state
      .argon2
      .verify_password(password.as_bytes(), &hash)
      .is_ok()
  });
  if !verified {
    tracing::warn!(user = %username, "rejected credentials");
    return Err(ApiError::Unauthorized);
  }

  Ok(creds.principal)
}

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: PortalStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    authenticate(&parts.headers, state).await.map(Authenticated)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::http::Request;
  use chrono::Utc;
  use frami_core::{groups::GroupTable, user::User};
  use frami_store_sqlite::SqliteStore;

  use super::*;
  use crate::tests::cheap_argon2;

  async fn make_state(password: &str) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store
      .provision_groups(GroupTable::standard().unwrap())
      .await
      .unwrap();
    let state = AppState::new(Arc::new(store)).with_argon2(cheap_argon2());

    let mut user = User::new("user", Utc::now());
    user.groups = vec!["patient".into()];
    user.password = crate::hash_password(&state.argon2, password).unwrap();
    state.store.create_user(user).await.unwrap();
    state
  }

  async fn extract(
    req: Request<axum::body::Body>,
    state: &AppState<SqliteStore>,
  ) -> Result<Authenticated, ApiError> {
    let (mut parts, _) = req.into_parts();
    Authenticated::from_request_parts(&mut parts, state).await
  }

  fn basic(user: &str, pass: &str) -> String {
    let encoded = B64.encode(format!("{user}:{pass}"));
    format!("Basic {encoded}")
  }

  #[tokio::test]
  async fn correct_credentials() {
    let state = make_state("correct horse").await;
    let req = Request::builder()
      .header(header::AUTHORIZATION, basic("user", "correct horse"))
      .body(axum::body::Body::empty())
      .unwrap();
    let Authenticated(principal) = extract(req, &state).await.unwrap();
    assert_eq!(principal.username, "user");
    assert!(principal.in_group("patient"));
  }

  #[tokio::test]
  async fn wrong_password() {
    let state = make_state("correct horse").await;
    let req = Request::builder()
      .header(header::AUTHORIZATION, basic("user", "wrong"))
      .body(axum::body::Body::empty())
      .unwrap();
    assert!(matches!(extract(req, &state).await, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn unknown_user() {
    let state = make_state("correct horse").await;
    let req = Request::builder()
      .header(header::AUTHORIZATION, basic("nobody", "correct horse"))
      .body(axum::body::Body::empty())
      .unwrap();
    assert!(matches!(extract(req, &state).await, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn missing_header() {
    let state = make_state("correct horse").await;
    let req = Request::builder().body(axum::body::Body::empty()).unwrap();
    assert!(matches!(extract(req, &state).await, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn invalid_base64() {
    let state = make_state("correct horse").await;
    let req = Request::builder()
      .header(header::AUTHORIZATION, "Basic !!!not-base64!!!")
      .body(axum::body::Body::empty())
      .unwrap();
    assert!(matches!(extract(req, &state).await, Err(ApiError::Unauthorized)));
  }
}
