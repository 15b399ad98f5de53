//! Access policy: who may do what to which collection or instance.
//!
//! Every collection carries a [`CollectionPolicy`]. A principal is
//! *privileged* for a collection when it belongs to one of the collection's
//! admin groups. Privileged principals may list and create without further
//! checks. Everyone else needs the model-level permission for those, and
//! every instance action needs it regardless of privilege. Non-privileged
//! principals only ever see instances matching the collection's ownership
//! predicate.
//!
//! When a scoped lookup comes back empty, privileged principals are told the
//! instance does not exist while everyone else is told they are forbidden,
//! so existence never leaks outside the caller's scope.

use std::{collections::BTreeSet, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
  Error,
  model::{Model, ModelKind},
  scope::{Filter, Ownership},
  user::UserId,
};

/// The default admin group name.
pub const ADMIN_GROUP: &str = "admin";

/// The default group for regular portal users.
pub const PATIENT_GROUP: &str = "patient";

// ─── Permissions ─────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
  View,
  Add,
  Change,
  Delete,
}

impl Verb {
  pub const ALL: [Verb; 4] = [Self::View, Self::Add, Self::Change, Self::Delete];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::View => "view",
      Self::Add => "add",
      Self::Change => "change",
      Self::Delete => "delete",
    }
  }
}

/// A model-level permission, written `<verb>_<model>` (e.g. `add_answer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Permission {
  pub verb:  Verb,
  pub model: ModelKind,
}

impl Permission {
  pub fn new(verb: Verb, model: ModelKind) -> Self { Self { verb, model } }

  pub fn codename(self) -> String {
    format!("{}_{}", self.verb.as_str(), self.model.name())
  }
}

impl FromStr for Permission {
  type Err = Error;

  fn from_str(codename: &str) -> crate::Result<Self> {
    let unknown = || Error::UnknownPermission(codename.to_owned());
    let (verb, model) = codename.split_once('_').ok_or_else(unknown)?;
    let verb = Verb::ALL
      .into_iter()
      .find(|v| v.as_str() == verb)
      .ok_or_else(unknown)?;
    let model = ModelKind::from_name(model).ok_or_else(unknown)?;
    Ok(Self::new(verb, model))
  }
}

impl std::fmt::Display for Permission {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}_{}", self.verb.as_str(), self.model.name())
  }
}

// ─── Actions ─────────────────────────────────────────────────────────────────

/// A request-level operation on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  List,
  Create,
  Retrieve,
  Update,
  PartialUpdate,
  Destroy,
}

impl Action {
  /// The permission verb required for this action.
  pub fn verb(self) -> Verb {
    match self {
      Self::List | Self::Retrieve => Verb::View,
      Self::Create => Verb::Add,
      Self::Update | Self::PartialUpdate => Verb::Change,
      Self::Destroy => Verb::Delete,
    }
  }
}

// ─── Principal ───────────────────────────────────────────────────────────────

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
  pub id:          UserId,
  pub username:    String,
  /// Group names, including `admin` for staff.
  pub groups:      BTreeSet<String>,
  /// Union of the permissions of every group.
  pub permissions: BTreeSet<Permission>,
}

impl Principal {
  pub fn in_group(&self, group: &str) -> bool { self.groups.contains(group) }

  pub fn has_perm(&self, perm: Permission) -> bool {
    self.permissions.contains(&perm)
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Why an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
  Forbidden,
  NotFound,
}

/// Access rules for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPolicy {
  pub model:        ModelKind,
  /// Groups whose members see the whole collection. May be empty.
  pub admin_groups: Vec<String>,
  pub ownership:    Ownership,
}

impl CollectionPolicy {
  /// A policy with the default admin group set, `{admin}`.
  pub fn new(model: ModelKind, ownership: Ownership) -> Self {
    Self {
      model,
      admin_groups: vec![ADMIN_GROUP.to_owned()],
      ownership,
    }
  }

  pub fn with_admin_groups<I, S>(mut self, groups: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.admin_groups = groups.into_iter().map(Into::into).collect();
    self
  }

  pub fn is_privileged(&self, principal: &Principal) -> bool {
    self.admin_groups.iter().any(|g| principal.in_group(g))
  }

  pub fn permission(&self, action: Action) -> Permission {
    Permission::new(action.verb(), self.model)
  }

  /// Permission check, made before any instance is looked up. Privileged
  /// principals pass `list` and `create` unconditionally; instance actions
  /// require the model permission of everyone.
  pub fn check(
    &self,
    principal: &Principal,
    action: Action,
  ) -> Result<(), Denied> {
    let collection_level = matches!(action, Action::List | Action::Create);
    if collection_level && self.is_privileged(principal) {
      return Ok(());
    }
    if principal.has_perm(self.permission(action)) {
      Ok(())
    } else {
      tracing::debug!(
        user = %principal.username,
        permission = %self.permission(action),
        "missing model permission"
      );
      Err(Denied::Forbidden)
    }
  }

  /// The visibility filter for `principal`: everything for privileged
  /// callers, otherwise the ownership predicate.
  pub fn scope(&self, principal: &Principal) -> Filter {
    if self.is_privileged(principal) {
      Filter::all()
    } else {
      Filter::all().and(self.ownership.resolve(principal))
    }
  }

  /// Outcome for an instance that is not visible under [`Self::scope`].
  pub fn missing(&self, principal: &Principal) -> Denied {
    if self.is_privileged(principal) {
      Denied::NotFound
    } else {
      Denied::Forbidden
    }
  }

  /// Instance-level check for an instance found under [`Self::scope`].
  pub fn check_instance<M: Model>(
    &self,
    principal: &Principal,
    action: Action,
    instance: &M,
  ) -> Result<(), Denied> {
    self.check(principal, action)?;
    if self.is_privileged(principal) || self.scope(principal).matches(instance)
    {
      Ok(())
    } else {
      Err(Denied::Forbidden)
    }
  }
}
