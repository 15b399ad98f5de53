//! JSON REST API for the Frami patient portal.
//!
//! Exposes an axum [`Router`] backed by any [`frami_core::store::PortalStore`].
//! Every route requires HTTP Basic credentials; TLS and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", frami_api::router(AppState::new(store.clone())))
//! ```

pub mod auth;
pub mod collections;
pub mod error;
pub mod notifications;
pub mod resources;
pub mod users;

use std::sync::Arc;

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use axum::{
  Router,
  routing::{delete, get, post, put},
};
use frami_core::{
  entity::{
    Answer, Appointment, AppointmentRequest, LabResult, Prescription,
    PrescriptionRequest, Question,
  },
  notification::{GroupNotification, UserNotification},
  store::PortalStore,
  user::User,
};
use rand_core::OsRng;

pub use error::ApiError;

/// Shared state handed to every handler.
pub struct AppState<S> {
  pub store:  Arc<S>,
  /// Hasher for new passwords. Verification reads its parameters from the
  /// stored hash.
  pub argon2: Argon2<'static>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), argon2: self.argon2.clone() }
  }
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, argon2: Argon2::default() }
  }

  pub fn with_argon2(mut self, argon2: Argon2<'static>) -> Self {
    self.argon2 = argon2;
    self
  }
}

/// Hash `password` into an argon2 PHC string with a fresh salt.
pub fn hash_password(
  argon2: &Argon2<'_>,
  password: &str,
) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  argon2
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| ApiError::Internal(format!("argon2 error: {e}")))
}

/// Build the portal router for `state`.
///
/// Methods a collection does not expose answer `405 Method Not Allowed`.
pub fn router<S>(state: AppState<S>) -> Router<()>
where
  S: PortalStore + 'static,
{
  use resources as r;

  Router::new()
    // Appointments
    .route(
      "/appointment",
      get(r::list::<S, Appointment>).post(r::create::<S, Appointment>),
    )
    .route(
      "/appointment/{id}",
      get(r::retrieve::<S, Appointment>)
        .put(r::update::<S, Appointment>)
        .patch(r::partial_update::<S, Appointment>)
        .delete(r::destroy::<S, Appointment>),
    )
    .route(
      "/appointment-request",
      get(r::list::<S, AppointmentRequest>)
        .post(r::create::<S, AppointmentRequest>),
    )
    .route(
      "/appointment-request/{id}",
      get(r::retrieve::<S, AppointmentRequest>)
        .delete(r::destroy::<S, AppointmentRequest>),
    )
    // Prescriptions
    .route("/prescription", post(r::create::<S, Prescription>))
    .route(
      "/prescription/{id}",
      get(r::retrieve::<S, Prescription>)
        .put(r::update::<S, Prescription>)
        .patch(r::partial_update::<S, Prescription>)
        .delete(r::destroy::<S, Prescription>),
    )
    .route("/prescription-request", post(r::create::<S, PrescriptionRequest>))
    .route(
      "/prescription-request/{id}",
      delete(r::destroy::<S, PrescriptionRequest>),
    )
    // Questions and answers
    .route(
      "/question",
      get(r::list::<S, Question>).post(r::create::<S, Question>),
    )
    .route("/question/{id}", get(r::retrieve::<S, Question>))
    .route("/answer", post(r::create::<S, Answer>))
    // Lab results
    .route(
      "/result",
      get(r::list::<S, LabResult>).post(r::create::<S, LabResult>),
    )
    .route(
      "/result/{id}",
      get(r::retrieve::<S, LabResult>)
        .put(r::update::<S, LabResult>)
        .patch(r::partial_update::<S, LabResult>)
        .delete(r::destroy::<S, LabResult>),
    )
    // Users
    .route("/user", get(r::list::<S, User>).post(users::create::<S>))
    .route(
      "/user/{id}",
      get(r::retrieve::<S, User>)
        .put(users::update::<S>)
        .patch(users::partial_update::<S>)
        .delete(users::destroy::<S>),
    )
    // Notifications
    .route(
      "/user-notification",
      get(notifications::list::<S, UserNotification>),
    )
    .route(
      "/user-notification/{id}",
      put(notifications::update::<S, UserNotification>)
        .patch(notifications::partial_update::<S, UserNotification>),
    )
    .route(
      "/group-notification",
      get(notifications::list::<S, GroupNotification>),
    )
    .route(
      "/group-notification/{id}",
      put(notifications::update::<S, GroupNotification>)
        .patch(notifications::partial_update::<S, GroupNotification>),
    )
    .with_state(state)
}
