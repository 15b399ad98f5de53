//! Notification records produced by the fan-out planner.
//!
//! Both kinds share every column except the addressee. After creation only
//! `read` may change, and only from unread to read.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  model::{Model, ModelKind, Reference, Relation, Row, Target, Value},
  payload::{Payload, ValidationErrors},
  user::UserId,
};

/// The kind of change a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
  Created,
  Changed,
  Deleted,
}

impl Event {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Created => "created",
      Self::Changed => "changed",
      Self::Deleted => "deleted",
    }
  }
}

impl FromStr for Event {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "created" => Ok(Self::Created),
      "changed" => Ok(Self::Changed),
      "deleted" => Ok(Self::Deleted),
      other => Err(Error::UnknownEvent(other.to_owned())),
    }
  }
}

impl std::fmt::Display for Event {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Accept `read` and nothing else. Setting it back to `false` is a no-op.
fn mark_read(
  read: &mut bool,
  payload: &Payload,
) -> Result<(), ValidationErrors> {
  let mut errors = ValidationErrors::new();
  if let Some(true) = payload.bool(&mut errors, "read", false) {
    *read = true;
  }
  errors.finish(())
}

fn target_from_row(row: &Row) -> Result<Target> {
  Target::from_parts(&row.text("target_type")?, row.int("target_id")?)
}

fn uuid_from_row(row: &Row) -> Result<Uuid> {
  let raw = row.text("uuid")?;
  Uuid::parse_str(&raw).map_err(|e| Error::Column {
    column: "uuid".to_owned(),
    reason: e.to_string(),
  })
}

// ─── UserNotification ────────────────────────────────────────────────────────

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNotification {
  pub id:            i64,
  /// Correlation id shared by every notification of the same change.
  pub uuid:          Uuid,
  pub target:        Target,
  pub target_name:   String,
  pub event:         Event,
  pub read:          bool,
  pub creation_date: DateTime<Utc>,
  pub user:          UserId,
}

impl Model for UserNotification {
  const KIND: ModelKind = ModelKind::UserNotification;
  const FIELDS: &'static [&'static str] = &[
    "uuid",
    "target_type",
    "target_id",
    "target_name",
    "event",
    "read",
    "creation_date",
    "user",
  ];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "uuid" => self.uuid.to_string().into(),
      "target_type" => self.target.discriminant().into(),
      "target_id" => self.target.id().into(),
      "target_name" => self.target_name.as_str().into(),
      "event" => self.event.as_str().into(),
      "read" => self.read.into(),
      "creation_date" => self.creation_date.into(),
      "user" => self.user.into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:            row.int("id")?,
      uuid:          uuid_from_row(row)?,
      target:        target_from_row(row)?,
      target_name:   row.text("target_name")?,
      event:         row.text("event")?.parse()?,
      read:          row.bool("read")?,
      creation_date: row.time("creation_date")?,
      user:          row.int("user")?,
    })
  }

  fn relation(&self, field: &str) -> Option<Relation> {
    match field {
      "user" => Some(Relation::User(Some(self.user))),
      _ => None,
    }
  }

  fn references(&self) -> Vec<Reference> {
    vec![Reference::user("user", self.user)]
  }

  fn apply(
    &mut self,
    payload: &Payload,
    _partial: bool,
    _now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    mark_read(&mut self.read, payload)
  }
}

// ─── GroupNotification ───────────────────────────────────────────────────────

/// A notification addressed to every member of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupNotification {
  pub id:            i64,
  pub uuid:          Uuid,
  pub target:        Target,
  pub target_name:   String,
  pub event:         Event,
  pub read:          bool,
  pub creation_date: DateTime<Utc>,
  /// Group name.
  pub group:         String,
}

impl Model for GroupNotification {
  const KIND: ModelKind = ModelKind::GroupNotification;
  const FIELDS: &'static [&'static str] = &[
    "uuid",
    "target_type",
    "target_id",
    "target_name",
    "event",
    "read",
    "creation_date",
    "group",
  ];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "uuid" => self.uuid.to_string().into(),
      "target_type" => self.target.discriminant().into(),
      "target_id" => self.target.id().into(),
      "target_name" => self.target_name.as_str().into(),
      "event" => self.event.as_str().into(),
      "read" => self.read.into(),
      "creation_date" => self.creation_date.into(),
      "group" => self.group.as_str().into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:            row.int("id")?,
      uuid:          uuid_from_row(row)?,
      target:        target_from_row(row)?,
      target_name:   row.text("target_name")?,
      event:         row.text("event")?.parse()?,
      read:          row.bool("read")?,
      creation_date: row.time("creation_date")?,
      group:         row.text("group")?,
    })
  }

  fn apply(
    &mut self,
    payload: &Payload,
    _partial: bool,
    _now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    mark_read(&mut self.read, payload)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn notification() -> UserNotification {
    UserNotification {
      id:            1,
      uuid:          Uuid::new_v4(),
      target:        Target::Question(3),
      target_name:   "question".into(),
      event:         Event::Created,
      read:          false,
      creation_date: Utc::now(),
      user:          2,
    }
  }

  #[test]
  fn only_read_is_mutable() {
    let before = notification();
    let mut after = before.clone();
    let payload: Payload = serde_json::from_value(json!({
      "read": true,
      "user": 99,
      "event": "deleted",
      "target_name": "appointment",
    }))
    .unwrap();

    after.apply(&payload, true, Utc::now()).unwrap();
    assert!(after.read);
    assert_eq!(UserNotification { read: false, ..after }, before);
  }

  #[test]
  fn read_never_reverts() {
    let mut n = notification();
    n.read = true;
    let payload: Payload =
      serde_json::from_value(json!({ "read": false })).unwrap();
    n.apply(&payload, false, Utc::now()).unwrap();
    assert!(n.read);
  }

  #[test]
  fn unknown_event_is_rejected() {
    assert!(matches!(
      "renamed".parse::<Event>(),
      Err(Error::UnknownEvent(e)) if e == "renamed"
    ));
  }

  #[test]
  fn persisted_unknown_target_type_fails_closed() {
    let n = notification();
    let mut row = Row::new();
    for field in UserNotification::FIELDS.iter().chain(["id"].iter()) {
      row.insert(*field, n.value(field).unwrap());
    }
    assert_eq!(UserNotification::from_row(&row).unwrap(), n);

    row.insert("target_type", Value::Text("invoice".into()));
    assert!(matches!(
      UserNotification::from_row(&row),
      Err(Error::UnregisteredTarget(_))
    ));
  }
}
