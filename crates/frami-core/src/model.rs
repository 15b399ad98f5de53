//! Model metadata shared by every persisted type.
//!
//! A [`Model`] describes its own columns as a flat list of [`Value`]s, which
//! is all a storage backend needs to insert, update, select and filter it
//! without knowing the concrete type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  payload::{Payload, ValidationErrors},
  user::UserId,
};

// ─── Model kinds ─────────────────────────────────────────────────────────────

/// Every collection known to the portal.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
  Appointment,
  AppointmentRequest,
  Prescription,
  PrescriptionRequest,
  Question,
  Answer,
  Result,
  User,
  UserNotification,
  GroupNotification,
}

impl ModelKind {
  pub const ALL: [ModelKind; 10] = [
    Self::Appointment,
    Self::AppointmentRequest,
    Self::Prescription,
    Self::PrescriptionRequest,
    Self::Question,
    Self::Answer,
    Self::Result,
    Self::User,
    Self::UserNotification,
    Self::GroupNotification,
  ];

  /// Canonical lowercase name. Used for permission codenames, table names and
  /// notification `target_name`s.
  pub fn name(self) -> &'static str {
    match self {
      Self::Appointment => "appointment",
      Self::AppointmentRequest => "appointmentrequest",
      Self::Prescription => "prescription",
      Self::PrescriptionRequest => "prescriptionrequest",
      Self::Question => "question",
      Self::Answer => "answer",
      Self::Result => "result",
      Self::User => "user",
      Self::UserNotification => "usernotification",
      Self::GroupNotification => "groupnotification",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.name() == name)
  }
}

impl std::fmt::Display for ModelKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

// ─── Column values ───────────────────────────────────────────────────────────

/// A single column value as seen by filters and storage backends.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Int(i64),
  Bool(bool),
  Text(String),
  Time(DateTime<Utc>),
}

impl From<i64> for Value {
  fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<String> for Value {
  fn from(v: String) -> Self { Self::Text(v) }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<DateTime<Utc>> for Value {
  fn from(v: DateTime<Utc>) -> Self { Self::Time(v) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

/// A row read back from storage, keyed by column name.
///
/// Timestamps arrive as RFC 3339 text and booleans as integers; the typed
/// getters accept both representations.
#[derive(Debug, Clone, Default)]
pub struct Row {
  columns: BTreeMap<String, Value>,
}

impl Row {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, column: impl Into<String>, value: Value) {
    self.columns.insert(column.into(), value);
  }

  fn get(&self, column: &str) -> Result<&Value> {
    self.columns.get(column).ok_or_else(|| Error::Column {
      column: column.to_owned(),
      reason: "missing".to_owned(),
    })
  }

  fn mismatch(column: &str, want: &str, got: &Value) -> Error {
    Error::Column {
      column: column.to_owned(),
      reason: format!("expected {want}, found {got:?}"),
    }
  }

  pub fn int(&self, column: &str) -> Result<i64> {
    match self.get(column)? {
      Value::Int(v) => Ok(*v),
      other => Err(Self::mismatch(column, "integer", other)),
    }
  }

  pub fn opt_int(&self, column: &str) -> Result<Option<i64>> {
    match self.get(column)? {
      Value::Null => Ok(None),
      _ => self.int(column).map(Some),
    }
  }

  pub fn text(&self, column: &str) -> Result<String> {
    match self.get(column)? {
      Value::Text(v) => Ok(v.clone()),
      other => Err(Self::mismatch(column, "text", other)),
    }
  }

  pub fn bool(&self, column: &str) -> Result<bool> {
    match self.get(column)? {
      Value::Bool(v) => Ok(*v),
      Value::Int(v) => Ok(*v != 0),
      other => Err(Self::mismatch(column, "boolean", other)),
    }
  }

  pub fn time(&self, column: &str) -> Result<DateTime<Utc>> {
    match self.get(column)? {
      Value::Time(v) => Ok(*v),
      Value::Text(s) => DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Column {
          column: column.to_owned(),
          reason: e.to_string(),
        }),
      other => Err(Self::mismatch(column, "timestamp", other)),
    }
  }
}

// ─── Polymorphic targets ─────────────────────────────────────────────────────

/// A reference to one of the entity types a notification may point at.
///
/// The variant is the type discriminator; anything outside this union is
/// rejected by [`Target::from_parts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Target {
  Appointment(i64),
  AppointmentRequest(i64),
  Prescription(i64),
  PrescriptionRequest(i64),
  Question(i64),
  Answer(i64),
  Result(i64),
}

impl Target {
  pub fn kind(self) -> ModelKind {
    match self {
      Self::Appointment(_) => ModelKind::Appointment,
      Self::AppointmentRequest(_) => ModelKind::AppointmentRequest,
      Self::Prescription(_) => ModelKind::Prescription,
      Self::PrescriptionRequest(_) => ModelKind::PrescriptionRequest,
      Self::Question(_) => ModelKind::Question,
      Self::Answer(_) => ModelKind::Answer,
      Self::Result(_) => ModelKind::Result,
    }
  }

  pub fn id(self) -> i64 {
    match self {
      Self::Appointment(id)
      | Self::AppointmentRequest(id)
      | Self::Prescription(id)
      | Self::PrescriptionRequest(id)
      | Self::Question(id)
      | Self::Answer(id)
      | Self::Result(id) => id,
    }
  }

  /// The discriminant string stored in the `target_type` column.
  pub fn discriminant(self) -> &'static str { self.kind().name() }

  /// Rebuild a target from its stored discriminant and id.
  pub fn from_parts(discriminant: &str, id: i64) -> Result<Self> {
    let kind = ModelKind::from_name(discriminant)
      .ok_or_else(|| Error::UnregisteredTarget(discriminant.to_owned()))?;
    Self::new(kind, id)
  }

  pub fn new(kind: ModelKind, id: i64) -> Result<Self> {
    Ok(match kind {
      ModelKind::Appointment => Self::Appointment(id),
      ModelKind::AppointmentRequest => Self::AppointmentRequest(id),
      ModelKind::Prescription => Self::Prescription(id),
      ModelKind::PrescriptionRequest => Self::PrescriptionRequest(id),
      ModelKind::Question => Self::Question(id),
      ModelKind::Answer => Self::Answer(id),
      ModelKind::Result => Self::Result(id),
      other => return Err(Error::UnregisteredTarget(other.name().to_owned())),
    })
  }
}

// ─── Relations ───────────────────────────────────────────────────────────────

/// What a single attribute of a model points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
  /// A user reference, possibly unset.
  User(Option<UserId>),
  /// Another entity.
  Entity(Target),
}

/// What a reference column must resolve to for a write to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Referent {
  /// An existing user, optionally required to belong to a group.
  User { id: UserId, group: Option<&'static str> },
  Entity(Target),
}

/// A reference column together with the value it must resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
  pub field: &'static str,
  pub to:    Referent,
}

impl Reference {
  pub fn user(field: &'static str, id: UserId) -> Self {
    Self { field, to: Referent::User { id, group: None } }
  }

  pub fn member(field: &'static str, id: UserId, group: &'static str) -> Self {
    Self { field, to: Referent::User { id, group: Some(group) } }
  }

  pub fn entity(field: &'static str, target: Target) -> Self {
    Self { field, to: Referent::Entity(target) }
  }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A persisted collection member.
pub trait Model: Serialize + Clone + Send + Sync + 'static {
  const KIND: ModelKind;

  /// Persisted columns, excluding `id`.
  const FIELDS: &'static [&'static str];

  fn id(&self) -> i64;

  /// Current value of a column (`id` included). `None` for unknown columns.
  fn value(&self, field: &str) -> Option<Value>;

  fn from_row(row: &Row) -> Result<Self>;

  /// Attribute lookup used when walking fan-out paths.
  fn relation(&self, _field: &str) -> Option<Relation> { None }

  /// Columns that must resolve before a write is accepted.
  fn references(&self) -> Vec<Reference> { Vec::new() }

  /// Apply an update payload. With `partial` unset every required field must
  /// be present. Unknown and read-only fields are ignored.
  fn apply(
    &mut self,
    payload: &Payload,
    partial: bool,
    now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors>;

  /// This instance as a notification target, if its type is one.
  fn target(&self) -> Option<Target> { Target::new(Self::KIND, self.id()).ok() }

  /// Load nested read-only collections (e.g. a question's answers).
  fn hydrate<L: crate::fanout::Lookup>(
    &mut self,
    _lookup: &L,
  ) -> Result<(), L::Error> {
    Ok(())
  }
}

/// A model that may be created from a request payload.
pub trait Create: Model {
  /// Build an unsaved instance; `id` is assigned by the store.
  fn create(
    payload: &Payload,
    now: DateTime<Utc>,
  ) -> Result<Self, ValidationErrors>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn target_round_trips_through_discriminant() {
    let target = Target::AppointmentRequest(7);
    assert_eq!(target.discriminant(), "appointmentrequest");
    assert_eq!(Target::from_parts("appointmentrequest", 7).unwrap(), target);
  }

  #[test]
  fn unregistered_target_type_fails_closed() {
    assert!(matches!(
      Target::from_parts("spaceship", 1),
      Err(Error::UnregisteredTarget(name)) if name == "spaceship"
    ));
    assert!(matches!(
      Target::new(ModelKind::User, 1),
      Err(Error::UnregisteredTarget(_))
    ));
  }

  #[test]
  fn row_getters_accept_storage_representations() {
    let mut row = Row::new();
    row.insert("flag", Value::Int(1));
    row.insert("at", Value::Text("2024-01-02T03:04:05+00:00".into()));
    row.insert("maybe", Value::Null);

    assert!(row.bool("flag").unwrap());
    assert_eq!(row.time("at").unwrap().to_rfc3339(), "2024-01-02T03:04:05+00:00");
    assert_eq!(row.opt_int("maybe").unwrap(), None);
    assert!(row.text("flag").is_err());
    assert!(row.int("absent").is_err());
  }
}
