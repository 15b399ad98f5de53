//! Request payloads and per-field validation errors.
//!
//! A [`Payload`] is the decoded JSON object of a create or update request.
//! Field accessors record failures into a [`ValidationErrors`] map instead of
//! returning early, so a single response lists every problem at once.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// A single problem with one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
  /// Machine-readable code, e.g. `required` or `does_not_exist`.
  pub code:    String,
  pub message: String,
}

/// Field name → list of problems, serialised as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<FieldError>>);

impl ValidationErrors {
  pub fn new() -> Self { Self::default() }

  pub fn single(
    field: &str,
    code: &str,
    message: impl Into<String>,
  ) -> Self {
    let mut errors = Self::new();
    errors.add(field, code, message);
    errors
  }

  pub fn add(&mut self, field: &str, code: &str, message: impl Into<String>) {
    self.0.entry(field.to_owned()).or_default().push(FieldError {
      code:    code.to_owned(),
      message: message.into(),
    });
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn get(&self, field: &str) -> Option<&[FieldError]> {
    self.0.get(field).map(Vec::as_slice)
  }

  /// Codes recorded for `field`, in insertion order.
  pub fn codes(&self, field: &str) -> Vec<&str> {
    self
      .get(field)
      .unwrap_or_default()
      .iter()
      .map(|e| e.code.as_str())
      .collect()
  }

  pub fn merge(&mut self, other: ValidationErrors) {
    for (field, errors) in other.0 {
      self.0.entry(field).or_default().extend(errors);
    }
  }

  /// `Ok(value)` if nothing was recorded, otherwise the collected errors.
  pub fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
    if self.is_empty() { Ok(value) } else { Err(self) }
  }
}

impl std::fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut first = true;
    for (field, errors) in &self.0 {
      for e in errors {
        if !first {
          f.write_str("; ")?;
        }
        first = false;
        write!(f, "{field}: {}", e.message)?;
      }
    }
    Ok(())
  }
}

impl std::error::Error for ValidationErrors {}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// A JSON object submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Json>);

impl Payload {
  /// Overwrite a field; used to stamp the creator on create.
  pub fn set(&mut self, field: &str, value: impl Into<Json>) {
    self.0.insert(field.to_owned(), value.into());
  }

  /// Look up `field`, recording `required` when it is absent (or null) and
  /// `required` is set.
  fn present(
    &self,
    errors: &mut ValidationErrors,
    field: &str,
    required: bool,
  ) -> Option<&Json> {
    match self.0.get(field) {
      Some(Json::Null) | None => {
        if required {
          errors.add(field, "required", "This field is required.");
        }
        None
      }
      Some(v) => Some(v),
    }
  }

  pub fn text(
    &self,
    errors: &mut ValidationErrors,
    field: &str,
    required: bool,
  ) -> Option<String> {
    match self.present(errors, field, required)? {
      Json::String(s) if required && s.trim().is_empty() => {
        errors.add(field, "blank", "This field may not be blank.");
        None
      }
      Json::String(s) => Some(s.clone()),
      Json::Number(n) => Some(n.to_string()),
      _ => {
        errors.add(field, "invalid", "Not a valid string.");
        None
      }
    }
  }

  pub fn int(
    &self,
    errors: &mut ValidationErrors,
    field: &str,
    required: bool,
  ) -> Option<i64> {
    match self.present(errors, field, required)? {
      Json::Number(n) if n.is_i64() => n.as_i64(),
      Json::String(s) if s.parse::<i64>().is_ok() => s.parse().ok(),
      _ => {
        errors.add(field, "incorrect_type", "Incorrect type. Expected pk value.");
        None
      }
    }
  }

  /// A nullable reference: `Some(None)` when explicitly set to null.
  pub fn opt_int(
    &self,
    errors: &mut ValidationErrors,
    field: &str,
  ) -> Option<Option<i64>> {
    match self.0.get(field)? {
      Json::Null => Some(None),
      _ => self.int(errors, field, false).map(Some),
    }
  }

  pub fn bool(
    &self,
    errors: &mut ValidationErrors,
    field: &str,
    required: bool,
  ) -> Option<bool> {
    match self.present(errors, field, required)? {
      Json::Bool(b) => Some(*b),
      Json::String(s) if matches!(s.as_str(), "true" | "True" | "1") => Some(true),
      Json::String(s) if matches!(s.as_str(), "false" | "False" | "0") => {
        Some(false)
      }
      _ => {
        errors.add(field, "invalid", "Must be a valid boolean.");
        None
      }
    }
  }

  pub fn time(
    &self,
    errors: &mut ValidationErrors,
    field: &str,
    required: bool,
  ) -> Option<DateTime<Utc>> {
    let parsed = match self.present(errors, field, required)? {
      Json::String(s) => DateTime::parse_from_rfc3339(s).ok(),
      _ => None,
    };
    if parsed.is_none() {
      errors.add(field, "invalid", "Datetime has wrong format. Use RFC 3339.");
    }
    parsed.map(|dt| dt.with_timezone(&Utc))
  }

  /// A list of strings, e.g. group names.
  pub fn strings(
    &self,
    errors: &mut ValidationErrors,
    field: &str,
  ) -> Option<Vec<String>> {
    match self.present(errors, field, false)? {
      Json::Array(items) => {
        let names: Option<Vec<String>> = items
          .iter()
          .map(|v| v.as_str().map(str::to_owned))
          .collect();
        if names.is_none() {
          errors.add(field, "invalid", "Expected a list of names.");
        }
        names
      }
      _ => {
        errors.add(field, "not_a_list", "Expected a list of items.");
        None
      }
    }
  }
}

impl From<Map<String, Json>> for Payload {
  fn from(map: Map<String, Json>) -> Self { Self(map) }
}
