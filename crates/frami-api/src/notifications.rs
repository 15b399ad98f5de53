//! Handlers for `/user-notification` and `/group-notification`.
//!
//! Notifications are created by the store's fan-out, never through the API.
//! Callers may list them and mark them read; the representation embeds the
//! entity the notification points at, or `null` once it has been deleted.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::Utc;
use frami_core::{
  access::{Action, Principal},
  model::{Model, Target},
  notification::{GroupNotification, UserNotification},
  scope,
  store::PortalStore,
};
use serde_json::Value as JsonValue;

use crate::{
  AppState,
  auth::Authenticated,
  collections::Resource,
  error::ApiError,
  resources::{Body, QueryPairs, load},
};

/// A notification type served by these handlers.
pub trait Notice: Resource {
  /// The entity the notification reports on.
  fn points_at(&self) -> Target;
}

impl Notice for UserNotification {
  fn points_at(&self) -> Target { self.target }
}

impl Notice for GroupNotification {
  fn points_at(&self) -> Target { self.target }
}

/// Serialise `notice` with its resolved target embedded.
async fn represent<S, N>(store: &S, notice: &N) -> Result<JsonValue, ApiError>
where
  S: PortalStore,
  N: Notice,
{
  let mut body = serde_json::to_value(notice)
    .map_err(|e| ApiError::Internal(format!("serialising notification: {e}")))?;
  let target = store
    .resolve(notice.points_at())
    .await
    .map_err(ApiError::store)?
    .unwrap_or(JsonValue::Null);
  if let Some(fields) = body.as_object_mut() {
    fields.insert("target".to_owned(), target);
  }
  Ok(body)
}

/// `GET /<kind>-notification[?read=...]`
pub async fn list<S, N>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Query(pairs): QueryPairs,
) -> Result<Json<Vec<JsonValue>>, ApiError>
where
  S: PortalStore,
  N: Notice,
{
  let policy = N::policy();
  policy.check(&principal, Action::List)?;

  let requested = scope::from_query(&pairs, N::PARAMS)?;
  let notices = state
    .store
    .list::<N>(policy.scope(&principal).extend(requested))
    .await
    .map_err(ApiError::store)?;

  let mut out = Vec::with_capacity(notices.len());
  for notice in &notices {
    out.push(represent(state.store.as_ref(), notice).await?);
  }
  Ok(Json(out))
}

async fn mark<S, N>(
  state: &AppState<S>,
  principal: &Principal,
  id: i64,
  body: Body,
  partial: bool,
) -> Result<Json<JsonValue>, ApiError>
where
  S: PortalStore,
  N: Notice,
{
  let action = if partial { Action::PartialUpdate } else { Action::Update };
  let mut notice = load::<S, N>(state, principal, action, id).await?;
  let Json(payload) = body?;
  let was_read = notice.value("read");
  notice.apply(&payload, partial, Utc::now())?;

  let notice = if notice.value("read") == was_read {
    notice
  } else {
    tracing::debug!(model = %N::KIND, id, user = %principal.username, "marked read");
    state.store.save(notice).await.map_err(ApiError::store)?
  };
  represent(state.store.as_ref(), &notice).await.map(Json)
}

/// `PUT /<kind>-notification/:id`
pub async fn update<S, N>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Path(id): Path<i64>,
  body: Body,
) -> Result<Json<JsonValue>, ApiError>
where
  S: PortalStore,
  N: Notice,
{
  mark::<S, N>(&state, &principal, id, body, false).await
}

/// `PATCH /<kind>-notification/:id`
pub async fn partial_update<S, N>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Path(id): Path<i64>,
  body: Body,
) -> Result<Json<JsonValue>, ApiError>
where
  S: PortalStore,
  N: Notice,
{
  mark::<S, N>(&state, &principal, id, body, true).await
}
