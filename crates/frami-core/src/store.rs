//! The `PortalStore` trait.
//!
//! Implemented by storage backends (e.g. `frami-store-sqlite`). The request
//! layer depends on this abstraction, not on any concrete backend.
//!
//! Every write runs in one transaction together with the fan-out it
//! triggers: either the row and its notifications are committed, or
//! neither is.

use std::future::Future;

use crate::{
  access::Principal,
  groups::GroupTable,
  model::{Model, Target},
  payload::ValidationErrors,
  scope::Filter,
  user::{User, UserId},
};

/// Classifies backend errors for the request layer.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The per-field errors if this is a client mistake (bad reference,
  /// duplicate username); otherwise `self` unchanged.
  fn into_validation(self) -> Result<ValidationErrors, Self>
  where
    Self: Sized;
}

/// A principal together with its stored password hash.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub principal:     Principal,
  /// argon2 PHC string.
  pub password_hash: String,
}

/// Abstraction over a portal storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait PortalStore: Send + Sync {
  type Error: StoreError;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Every `M` matching `filter`, in creation order.
  fn list<M: Model>(
    &self,
    filter: Filter,
  ) -> impl Future<Output = Result<Vec<M>, Self::Error>> + Send + '_;

  /// The `M` with `id`, if it exists and matches `filter`.
  fn get<M: Model>(
    &self,
    id: i64,
    filter: Filter,
  ) -> impl Future<Output = Result<Option<M>, Self::Error>> + Send + '_;

  /// Persist a new instance and return it with its assigned id.
  fn insert<M: Model>(
    &self,
    instance: M,
  ) -> impl Future<Output = Result<M, Self::Error>> + Send + '_;

  /// Overwrite a stored instance.
  fn save<M: Model>(
    &self,
    instance: M,
  ) -> impl Future<Output = Result<M, Self::Error>> + Send + '_;

  /// Delete a stored instance. Rows owned by it cascade.
  fn delete<M: Model>(
    &self,
    instance: M,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The stored entity `target` points at, as JSON. `None` once deleted.
  fn resolve(
    &self,
    target: Target,
  ) -> impl Future<Output = Result<Option<serde_json::Value>, Self::Error>>
  + Send
  + '_;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Persist a new user with its group memberships. `password` must
  /// already be hashed.
  fn create_user(
    &self,
    user: User,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Overwrite a user and replace its group memberships.
  fn save_user(
    &self,
    user: User,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Delete a user. Rows the user owns as patient or requester cascade;
  /// rows the user authored are handed to the sentinel user.
  fn delete_user(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Look up a principal by username for authentication.
  fn credentials(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send + '_;

  // ── Groups ────────────────────────────────────────────────────────────

  /// Create missing groups and replace the permissions of every group in
  /// `table`. Groups outside the table are left alone.
  fn provision_groups(
    &self,
    table: GroupTable,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
