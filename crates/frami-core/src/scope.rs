//! Scoped query filters.
//!
//! A [`Filter`] is a conjunction of [`Clause`]s; each clause matches when
//! its column equals any one of its values. Ownership scoping contributes one
//! clause and caller-supplied query parameters contribute more, so a
//! parameter can only ever narrow the scoped result.

use crate::{
  access::Principal,
  model::{Model, Value},
  payload::ValidationErrors,
};

// ─── Ownership ───────────────────────────────────────────────────────────────

/// How the comparison value of an ownership predicate is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerValue {
  /// The principal's own id.
  PrincipalId,
  /// Any group the principal belongs to.
  PrincipalGroups,
}

/// The field a non-privileged principal must own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
  pub field: &'static str,
  pub value: OwnerValue,
}

impl Ownership {
  pub const fn new(field: &'static str, value: OwnerValue) -> Self {
    Self { field, value }
  }

  pub fn resolve(&self, principal: &Principal) -> Clause {
    let values = match self.value {
      OwnerValue::PrincipalId => vec![Value::Int(principal.id)],
      OwnerValue::PrincipalGroups => principal
        .groups
        .iter()
        .map(|g| Value::Text(g.clone()))
        .collect(),
    };
    Clause::any_of(self.field, values)
  }
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// `column IN (values)`. An empty value list matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
  pub column: String,
  pub values: Vec<Value>,
}

impl Clause {
  pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
    Self { column: column.into(), values: vec![value.into()] }
  }

  pub fn any_of(column: impl Into<String>, values: Vec<Value>) -> Self {
    Self { column: column.into(), values }
  }

  pub fn matches<M: Model>(&self, instance: &M) -> bool {
    instance
      .value(&self.column)
      .is_some_and(|v| self.values.iter().any(|want| loosely_equal(want, &v)))
  }
}

/// Booleans are stored as integers; compare them as such.
fn loosely_equal(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Bool(x), Value::Int(y)) | (Value::Int(y), Value::Bool(x)) => {
      i64::from(*x) == *y
    }
    _ => a == b,
  }
}

/// A conjunction of clauses. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
  clauses: Vec<Clause>,
}

impl Filter {
  pub fn all() -> Self { Self::default() }

  pub fn is_all(&self) -> bool { self.clauses.is_empty() }

  pub fn and(mut self, clause: Clause) -> Self {
    self.clauses.push(clause);
    self
  }

  pub fn extend(mut self, other: Filter) -> Self {
    self.clauses.extend(other.clauses);
    self
  }

  pub fn clauses(&self) -> &[Clause] { &self.clauses }

  pub fn matches<M: Model>(&self, instance: &M) -> bool {
    self.clauses.iter().all(|c| c.matches(instance))
  }
}

// ─── Query parameters ────────────────────────────────────────────────────────

/// How a filterable query parameter is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
  Int,
  Bool,
  Text,
}

/// A query parameter a collection accepts as a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
  pub name: &'static str,
  pub kind: ParamKind,
}

impl Param {
  pub const fn int(name: &'static str) -> Self {
    Self { name, kind: ParamKind::Int }
  }

  pub const fn bool(name: &'static str) -> Self {
    Self { name, kind: ParamKind::Bool }
  }

  pub const fn text(name: &'static str) -> Self {
    Self { name, kind: ParamKind::Text }
  }

  fn parse(&self, raw: &str) -> Option<Value> {
    match self.kind {
      ParamKind::Int => raw.parse().ok().map(Value::Int),
      ParamKind::Bool => match raw {
        "true" | "True" | "1" => Some(Value::Bool(true)),
        "false" | "False" | "0" => Some(Value::Bool(false)),
        _ => None,
      },
      ParamKind::Text => Some(Value::Text(raw.to_owned())),
    }
  }
}

/// Build a filter from raw query pairs. Repeated names are OR-ed, distinct
/// names AND-ed. Names outside `accepted` are ignored.
pub fn from_query(
  pairs: &[(String, String)],
  accepted: &[Param],
) -> Result<Filter, ValidationErrors> {
  let mut errors = ValidationErrors::new();
  let mut filter = Filter::all();
  for param in accepted {
    let mut values = Vec::new();
    for (_, raw) in pairs.iter().filter(|(name, _)| name == param.name) {
      match param.parse(raw) {
        Some(v) => values.push(v),
        None => errors.add(
          param.name,
          "invalid",
          format!("Select a valid choice. {raw:?} is not one of the available choices."),
        ),
      }
    }
    if !values.is_empty() {
      filter = filter.and(Clause::any_of(param.name, values));
    }
  }
  errors.finish(filter)
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use chrono::Utc;

  use super::*;
  use crate::notification::{Event, GroupNotification};
  use crate::model::Target;

  fn principal(groups: &[&str]) -> Principal {
    Principal {
      id:          4,
      username:    "p".into(),
      groups:      groups.iter().map(|g| g.to_string()).collect(),
      permissions: BTreeSet::new(),
    }
  }

  fn note(group: &str, read: bool) -> GroupNotification {
    GroupNotification {
      id:            1,
      uuid:          uuid::Uuid::new_v4(),
      target:        Target::Question(1),
      target_name:   "question".into(),
      event:         Event::Created,
      read,
      creation_date: Utc::now(),
      group:         group.into(),
    }
  }

  fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
    raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn group_ownership_matches_any_membership() {
    let scope = Ownership::new("group", OwnerValue::PrincipalGroups)
      .resolve(&principal(&["patient", "nurses"]));
    assert!(scope.matches(&note("nurses", false)));
    assert!(!scope.matches(&note("admin", false)));
  }

  #[test]
  fn no_groups_sees_nothing() {
    let scope = Ownership::new("group", OwnerValue::PrincipalGroups)
      .resolve(&principal(&[]));
    assert!(scope.values.is_empty());
    assert!(!scope.matches(&note("admin", false)));
  }

  #[test]
  fn params_narrow_but_never_widen() {
    let accepted = [Param::text("group"), Param::bool("read")];
    let scoped = Filter::all().and(
      Ownership::new("group", OwnerValue::PrincipalGroups)
        .resolve(&principal(&["patient"])),
    );
    let requested =
      from_query(&pairs(&[("group", "admin"), ("group", "patient")]), &accepted)
        .unwrap();
    let filter = scoped.extend(requested);

    assert!(filter.matches(&note("patient", false)));
    assert!(!filter.matches(&note("admin", false)));
  }

  #[test]
  fn distinct_params_are_and_ed() {
    let accepted = [Param::text("group"), Param::bool("read")];
    let filter =
      from_query(&pairs(&[("group", "patient"), ("read", "true")]), &accepted)
        .unwrap();
    assert_eq!(filter.clauses().len(), 2);
    assert!(filter.matches(&note("patient", true)));
    assert!(!filter.matches(&note("patient", false)));
  }

  #[test]
  fn unknown_params_are_ignored_and_bad_values_rejected() {
    let accepted = [Param::int("patient")];
    assert!(from_query(&pairs(&[("page", "2")]), &accepted).unwrap().is_all());

    let err = from_query(&pairs(&[("patient", "me")]), &accepted).unwrap_err();
    assert_eq!(err.codes("patient"), ["invalid"]);
  }
}
