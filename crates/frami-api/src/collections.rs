//! Per-collection request configuration: access policy and accepted query
//! filters.

use frami_core::{
  access::CollectionPolicy,
  entity::{
    Answer, Appointment, AppointmentRequest, LabResult, Prescription,
    PrescriptionRequest, Question,
  },
  model::Model,
  notification::{GroupNotification, UserNotification},
  scope::{OwnerValue, Ownership, Param},
  user::User,
};

/// A model exposed as an HTTP collection.
pub trait Resource: Model {
  /// Query parameters accepted as filters on `list`.
  const PARAMS: &'static [Param];

  /// Whether `creator` is stamped with the caller on create.
  const STAMPS_CREATOR: bool = true;

  fn policy() -> CollectionPolicy;
}

fn owned_by(kind: frami_core::model::ModelKind, field: &'static str) -> CollectionPolicy {
  CollectionPolicy::new(kind, Ownership::new(field, OwnerValue::PrincipalId))
}

impl Resource for Appointment {
  const PARAMS: &'static [Param] =
    &[Param::int("patient"), Param::int("staff"), Param::int("creator")];

  fn policy() -> CollectionPolicy { owned_by(Self::KIND, "patient") }
}

impl Resource for AppointmentRequest {
  const PARAMS: &'static [Param] = &[Param::int("creator"), Param::int("staff")];

  fn policy() -> CollectionPolicy { owned_by(Self::KIND, "creator") }
}

impl Resource for Prescription {
  const PARAMS: &'static [Param] = &[Param::int("patient"), Param::int("creator")];

  fn policy() -> CollectionPolicy { owned_by(Self::KIND, "patient") }
}

impl Resource for PrescriptionRequest {
  const PARAMS: &'static [Param] =
    &[Param::int("prescription"), Param::int("creator")];

  fn policy() -> CollectionPolicy { owned_by(Self::KIND, "creator") }
}

impl Resource for Question {
  const PARAMS: &'static [Param] = &[Param::int("creator")];

  fn policy() -> CollectionPolicy { owned_by(Self::KIND, "creator") }
}

impl Resource for Answer {
  const PARAMS: &'static [Param] =
    &[Param::int("question"), Param::int("creator"), Param::bool("unread")];

  fn policy() -> CollectionPolicy { owned_by(Self::KIND, "creator") }
}

impl Resource for LabResult {
  const PARAMS: &'static [Param] =
    &[Param::int("patient"), Param::int("creator"), Param::bool("unread")];

  fn policy() -> CollectionPolicy { owned_by(Self::KIND, "patient") }
}

impl Resource for User {
  const PARAMS: &'static [Param] = &[Param::int("id")];
  const STAMPS_CREATOR: bool = false;

  fn policy() -> CollectionPolicy { owned_by(Self::KIND, "id") }
}

impl Resource for UserNotification {
  const PARAMS: &'static [Param] = &[Param::int("user"), Param::bool("read")];
  const STAMPS_CREATOR: bool = false;

  fn policy() -> CollectionPolicy {
    owned_by(Self::KIND, "user").with_admin_groups(Vec::<String>::new())
  }
}

impl Resource for GroupNotification {
  const PARAMS: &'static [Param] = &[Param::text("group"), Param::bool("read")];
  const STAMPS_CREATOR: bool = false;

  fn policy() -> CollectionPolicy {
    CollectionPolicy::new(
      Self::KIND,
      Ownership::new("group", OwnerValue::PrincipalGroups),
    )
    .with_admin_groups(Vec::<String>::new())
  }
}
