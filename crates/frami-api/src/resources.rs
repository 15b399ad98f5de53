//! Generic collection handlers shared by every domain collection.
//!
//! | Method   | Path          | Permission | Status |
//! |----------|---------------|------------|--------|
//! | `GET`    | `/<name>`     | view       | 200    |
//! | `POST`   | `/<name>`     | add        | 201    |
//! | `GET`    | `/<name>/:id` | view       | 200    |
//! | `PUT`    | `/<name>/:id` | change     | 200    |
//! | `PATCH`  | `/<name>/:id` | change     | 200    |
//! | `DELETE` | `/<name>/:id` | delete     | 204    |
//!
//! Which of these a collection exposes is decided by the router.

use axum::{
  Json,
  extract::{Path, Query, State, rejection::JsonRejection},
  http::StatusCode,
};
use chrono::Utc;
use frami_core::{
  access::{Action, Principal},
  model::Create,
  payload::Payload,
  scope,
  store::PortalStore,
};

use crate::{AppState, auth::Authenticated, collections::Resource, error::ApiError};

/// Raw query pairs, kept in order so repeated names survive.
pub type QueryPairs = Query<Vec<(String, String)>>;

/// A JSON body whose rejection is reported only after the access checks.
pub type Body = Result<Json<Payload>, JsonRejection>;

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Fetch the instance `id` for `action`, applying the collection's scope.
///
/// A permission failure is reported first; an instance outside the caller's
/// scope is masked according to [`frami_core::access::CollectionPolicy::missing`].
pub(crate) async fn load<S, M>(
  state: &AppState<S>,
  principal: &Principal,
  action: Action,
  id: i64,
) -> Result<M, ApiError>
where
  S: PortalStore,
  M: Resource,
{
  let policy = M::policy();
  policy.check(principal, action)?;

  let found = state
    .store
    .get::<M>(id, policy.scope(principal))
    .await
    .map_err(ApiError::store)?;
  let Some(instance) = found else {
    tracing::debug!(
      model = %M::KIND,
      id,
      user = %principal.username,
      "instance not visible"
    );
    return Err(policy.missing(principal).into());
  };

  policy.check_instance(principal, action, &instance)?;
  Ok(instance)
}

async fn write<S, M>(
  state: &AppState<S>,
  principal: &Principal,
  id: i64,
  body: Body,
  partial: bool,
) -> Result<Json<M>, ApiError>
where
  S: PortalStore,
  M: Resource,
{
  let action = if partial { Action::PartialUpdate } else { Action::Update };
  let mut instance = load::<S, M>(state, principal, action, id).await?;
  let Json(payload) = body?;
  instance.apply(&payload, partial, Utc::now())?;

  let saved = state.store.save(instance).await.map_err(ApiError::store)?;
  tracing::info!(model = %M::KIND, id, user = %principal.username, "updated");
  Ok(Json(saved))
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `GET /<name>[?field=value...]`
pub async fn list<S, M>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Query(pairs): QueryPairs,
) -> Result<Json<Vec<M>>, ApiError>
where
  S: PortalStore,
  M: Resource,
{
  let policy = M::policy();
  policy.check(&principal, Action::List)?;

  let requested = scope::from_query(&pairs, M::PARAMS)?;
  let items = state
    .store
    .list::<M>(policy.scope(&principal).extend(requested))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(items))
}

/// `POST /<name>`
pub async fn create<S, M>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  body: Body,
) -> Result<(StatusCode, Json<M>), ApiError>
where
  S: PortalStore,
  M: Resource + Create,
{
  M::policy().check(&principal, Action::Create)?;
  let Json(mut payload) = body?;
  if M::STAMPS_CREATOR {
    payload.set("creator", principal.id);
  }

  let instance = M::create(&payload, Utc::now())?;
  let saved = state.store.insert(instance).await.map_err(ApiError::store)?;
  tracing::info!(
    model = %M::KIND,
    id = saved.id(),
    user = %principal.username,
    "created"
  );
  Ok((StatusCode::CREATED, Json(saved)))
}

/// `GET /<name>/:id`
pub async fn retrieve<S, M>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Path(id): Path<i64>,
) -> Result<Json<M>, ApiError>
where
  S: PortalStore,
  M: Resource,
{
  load::<S, M>(&state, &principal, Action::Retrieve, id)
    .await
    .map(Json)
}

/// `PUT /<name>/:id`
pub async fn update<S, M>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Path(id): Path<i64>,
  body: Body,
) -> Result<Json<M>, ApiError>
where
  S: PortalStore,
  M: Resource,
{
  write(&state, &principal, id, body, false).await
}

/// `PATCH /<name>/:id`
pub async fn partial_update<S, M>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Path(id): Path<i64>,
  body: Body,
) -> Result<Json<M>, ApiError>
where
  S: PortalStore,
  M: Resource,
{
  write(&state, &principal, id, body, true).await
}

/// `DELETE /<name>/:id`
pub async fn destroy<S, M>(
  State(state): State<AppState<S>>,
  Authenticated(principal): Authenticated,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
  S: PortalStore,
  M: Resource,
{
  let instance = load::<S, M>(&state, &principal, Action::Destroy, id).await?;
  state.store.delete(instance).await.map_err(ApiError::store)?;
  tracing::info!(model = %M::KIND, id, user = %principal.username, "deleted");
  Ok(StatusCode::NO_CONTENT)
}
