//! Handlers for `/user` writes. Passwords are validated and hashed here;
//! listing and retrieval go through the generic handlers.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use chrono::Utc;
use frami_core::{
  access::{Action, Principal},
  model::{Create, Model},
  payload::{Payload, ValidationErrors},
  store::PortalStore,
  user::{User, validate_password},
};

use crate::{
  AppState,
  auth::Authenticated,
  collections::Resource,
  error::ApiError,
  hash_password,
  resources::{Body, load},
};

/// The plaintext password in `payload`, checked against the user it is
/// meant for.
fn new_password(
  payload: &Payload,
  user: &User,
  required: bool,
) -> Result<Option<String>, ValidationErrors> {
  let mut errors = ValidationErrors::new();
  let password = payload.text(&mut errors, "password", required);
  let password = errors.finish(password)?;
  if let Some(password) = &password {
    validate_password(password, user)?;
  }
  Ok(password)
}

/// `POST /user`
pub async fn create<S: PortalStore>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  body: Body,
) -> Result<(StatusCode, Json<User>), ApiError> {
  User::policy().check(&principal, Action::Create)?;
  let Json(payload) = body?;

  let mut errors = ValidationErrors::new();
  let mut user = match User::create(&payload, Utc::now()) {
    Ok(user) => user,
    Err(e) => {
      errors.merge(e);
      User::new(String::new(), Utc::now())
    }
  };
  let password = match new_password(&payload, &user, true) {
    Ok(password) => password,
    Err(e) => {
      errors.merge(e);
      None
    }
  };
  let password = errors.finish(password)?.unwrap_or_default();

  user.password = hash_password(&state.argon2, &password)?;
  let user = state.store.create_user(user).await.map_err(ApiError::store)?;
  tracing::info!(id = user.id, user = %principal.username, "user created");
  Ok((StatusCode::CREATED, Json(user)))
}

async fn write<S: PortalStore>(
  state: &AppState<S>,
  principal: &Principal,
  id: i64,
  body: Body,
  partial: bool,
) -> Result<Json<User>, ApiError> {
  let action = if partial { Action::PartialUpdate } else { Action::Update };
  let mut user = load::<S, User>(state, principal, action, id).await?;
  let Json(payload) = body?;
  user.apply(&payload, partial, Utc::now())?;

  if let Some(password) = new_password(&payload, &user, false)? {
    user.password = hash_password(&state.argon2, &password)?;
  }

  let user = state.store.save_user(user).await.map_err(ApiError::store)?;
  tracing::info!(id, user = %principal.username, "user updated");
  Ok(Json(user))
}

/// `PUT /user/:id`
pub async fn update<S: PortalStore>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Path(id): Path<i64>,
  body: Body,
) -> Result<Json<User>, ApiError> {
  write(&state, &principal, id, body, false).await
}

/// `PATCH /user/:id`
pub async fn partial_update<S: PortalStore>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Path(id): Path<i64>,
  body: Body,
) -> Result<Json<User>, ApiError> {
  write(&state, &principal, id, body, true).await
}

/// `DELETE /user/:id`
pub async fn destroy<S: PortalStore>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  let user = load::<S, User>(&state, &principal, Action::Destroy, id).await?;
  state.store.delete_user(user.id).await.map_err(ApiError::store)?;
  tracing::info!(id, user = %principal.username, "user deleted");
  Ok(StatusCode::NO_CONTENT)
}
