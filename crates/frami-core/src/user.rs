//! Users (principals) and credential rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  entity::Prescription,
  fanout::Lookup,
  model::{Create, Model, ModelKind, Row, Value},
  payload::{Payload, ValidationErrors},
};

pub type UserId = i64;

/// Username of the placeholder principal that inherits non-cascading
/// references when a user is deleted.
pub const SENTINEL_USERNAME: &str = "deleted";

/// A stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub id:            UserId,
  pub username:      String,
  pub email:         String,
  pub first_name:    String,
  pub last_name:     String,
  pub is_staff:      bool,
  /// Names of the groups the user is a member of.
  pub groups:        Vec<String>,
  /// argon2 PHC string; never serialised.
  #[serde(skip_serializing, default)]
  pub password:      String,
  pub date_joined:   DateTime<Utc>,
  /// Prescriptions where this user is the patient. Read-only.
  #[serde(default)]
  pub prescriptions: Vec<Prescription>,
}

impl User {
  pub fn new(username: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      id:            0,
      username:      username.into(),
      email:         String::new(),
      first_name:    String::new(),
      last_name:     String::new(),
      is_staff:      false,
      groups:        Vec::new(),
      password:      String::new(),
      date_joined:   now,
      prescriptions: Vec::new(),
    }
  }

  fn read_payload(
    &mut self,
    payload: &Payload,
    partial: bool,
    errors: &mut ValidationErrors,
  ) {
    if let Some(v) = payload.text(errors, "username", !partial) {
      self.username = v;
    }
    if let Some(v) = payload.text(errors, "email", false) {
      self.email = v;
    }
    if let Some(v) = payload.text(errors, "first_name", false) {
      self.first_name = v;
    }
    if let Some(v) = payload.text(errors, "last_name", false) {
      self.last_name = v;
    }
    if let Some(v) = payload.bool(errors, "is_staff", false) {
      self.is_staff = v;
    }
    if let Some(v) = payload.strings(errors, "groups") {
      self.groups = v;
    }
  }
}

impl Model for User {
  const KIND: ModelKind = ModelKind::User;
  const FIELDS: &'static [&'static str] = &[
    "username",
    "email",
    "first_name",
    "last_name",
    "is_staff",
    "password",
    "date_joined",
  ];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "username" => self.username.as_str().into(),
      "email" => self.email.as_str().into(),
      "first_name" => self.first_name.as_str().into(),
      "last_name" => self.last_name.as_str().into(),
      "is_staff" => self.is_staff.into(),
      "password" => self.password.as_str().into(),
      "date_joined" => self.date_joined.into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:            row.int("id")?,
      username:      row.text("username")?,
      email:         row.text("email")?,
      first_name:    row.text("first_name")?,
      last_name:     row.text("last_name")?,
      is_staff:      row.bool("is_staff")?,
      groups:        Vec::new(),
      password:      row.text("password")?,
      date_joined:   row.time("date_joined")?,
      prescriptions: Vec::new(),
    })
  }

  fn apply(
    &mut self,
    payload: &Payload,
    partial: bool,
    _now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    self.read_payload(payload, partial, &mut errors);
    errors.finish(())
  }

  fn hydrate<L: Lookup>(&mut self, lookup: &L) -> Result<(), L::Error> {
    self.groups = lookup.groups_of(self.id)?;
    self.prescriptions = lookup.children("patient", self.id)?;
    Ok(())
  }
}

impl Create for User {
  fn create(
    payload: &Payload,
    now: DateTime<Utc>,
  ) -> Result<Self, ValidationErrors> {
    let mut user = User::new(String::new(), now);
    let mut errors = ValidationErrors::new();
    user.read_payload(payload, false, &mut errors);
    errors.finish(user)
  }
}

// ─── Credential rules ────────────────────────────────────────────────────────

pub const MIN_PASSWORD_LENGTH: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
  "123456", "12345678", "123456789", "1234567890", "password", "password1",
  "qwerty", "qwertyuiop", "abc123", "111111", "iloveyou", "letmein",
  "welcome", "monkey", "dragon", "football", "baseball", "sunshine",
  "princess", "admin", "administrator", "passw0rd", "trustno1", "superman",
];

/// Reject weak passwords. Mirrors the usual rule set: minimum length, not
/// entirely numeric, not a well-known password, not derived from the
/// username or email.
pub fn validate_password(
  password: &str,
  user: &User,
) -> Result<(), ValidationErrors> {
  let mut errors = ValidationErrors::new();
  let field = "password";
  let lower = password.to_lowercase();

  if password.chars().count() < MIN_PASSWORD_LENGTH {
    errors.add(
      field,
      "password_too_short",
      format!(
        "This password is too short. It must contain at least \
         {MIN_PASSWORD_LENGTH} characters."
      ),
    );
  }
  if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
    errors.add(
      field,
      "password_entirely_numeric",
      "This password is entirely numeric.",
    );
  }
  if COMMON_PASSWORDS.contains(&lower.as_str()) {
    errors.add(field, "password_too_common", "This password is too common.");
  }

  let email_local = user.email.split('@').next().unwrap_or_default();
  let attributes = [
    user.username.as_str(),
    email_local,
    user.first_name.as_str(),
    user.last_name.as_str(),
  ];
  let similar = attributes.iter().any(|attr| {
    let attr = attr.to_lowercase();
    attr.len() >= 3 && (lower.contains(&attr) || attr.contains(&lower))
  });
  if similar {
    errors.add(
      field,
      "password_too_similar",
      "The password is too similar to the user's details.",
    );
  }

  errors.finish(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn user(name: &str) -> User {
    let mut u = User::new(name, Utc::now());
    u.email = format!("{name}@example.invalid");
    u
  }

  #[test]
  fn strong_password_passes() {
    assert!(validate_password("correct horse battery", &user("alice")).is_ok());
  }

  #[test]
  fn weak_passwords_report_every_rule() {
    let err = validate_password("1234567", &user("alice")).unwrap_err();
    assert_eq!(
      err.codes("password"),
      ["password_too_short", "password_entirely_numeric"]
    );

    let err = validate_password("password", &user("alice")).unwrap_err();
    assert_eq!(err.codes("password"), ["password_too_common"]);

    let err = validate_password("alice-rocks-1", &user("alice")).unwrap_err();
    assert_eq!(err.codes("password"), ["password_too_similar"]);
  }

  #[test]
  fn password_is_never_serialised() {
    let mut u = user("bob");
    u.password = "$argon2id$secret".into();
    let v = serde_json::to_value(&u).unwrap();
    assert!(v.get("password").is_none());
    assert_eq!(v["username"], "bob");
  }

  #[test]
  fn create_requires_username() {
    let payload: Payload =
      serde_json::from_value(serde_json::json!({ "email": "x@y.z" })).unwrap();
    let err = User::create(&payload, Utc::now()).unwrap_err();
    assert_eq!(err.codes("username"), ["required"]);
  }
}
