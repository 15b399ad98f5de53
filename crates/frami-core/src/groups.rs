//! Group → permission tables used to provision roles.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  Result,
  access::{ADMIN_GROUP, PATIENT_GROUP, Permission},
};

const ADMIN_PERMISSIONS: &[&str] = &[
  "add_answer",
  "add_appointment",
  "delete_appointment",
  "change_appointment",
  "view_appointment",
  "delete_appointmentrequest",
  "view_appointmentrequest",
  "add_prescription",
  "change_prescription",
  "delete_prescription",
  "view_prescription",
  "delete_prescriptionrequest",
  "view_question",
  "add_result",
  "change_result",
  "delete_result",
  "view_result",
  "add_user",
  "change_user",
  "delete_user",
  "view_user",
  "change_usernotification",
  "view_usernotification",
  "change_groupnotification",
  "view_groupnotification",
];

const PATIENT_PERMISSIONS: &[&str] = &[
  "view_appointment",
  "add_appointmentrequest",
  "delete_appointmentrequest",
  "view_appointmentrequest",
  "add_prescriptionrequest",
  "add_question",
  "view_question",
  "view_result",
  "view_user",
  "change_usernotification",
  "view_usernotification",
  "view_groupnotification",
];

/// Group name → granted permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupTable {
  groups: BTreeMap<String, BTreeSet<Permission>>,
}

impl GroupTable {
  pub fn new() -> Self { Self::default() }

  /// The portal's `admin` and `patient` roles.
  pub fn standard() -> Result<Self> {
    Self::new()
      .with_codenames(ADMIN_GROUP, ADMIN_PERMISSIONS)?
      .with_codenames(PATIENT_GROUP, PATIENT_PERMISSIONS)
  }

  /// Add (or replace) a group, parsing its permission codenames. Any
  /// codename that does not exist is a configuration error.
  pub fn with_codenames<S: AsRef<str>>(
    mut self,
    group: impl Into<String>,
    codenames: &[S],
  ) -> Result<Self> {
    let perms = codenames
      .iter()
      .map(|c| c.as_ref().parse())
      .collect::<Result<BTreeSet<Permission>>>()?;
    self.groups.insert(group.into(), perms);
    Ok(self)
  }

  pub fn permissions(&self, group: &str) -> Option<&BTreeSet<Permission>> {
    self.groups.get(group)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<Permission>)> {
    self.groups.iter().map(|(name, perms)| (name.as_str(), perms))
  }

  pub fn len(&self) -> usize { self.groups.len() }

  pub fn is_empty(&self) -> bool { self.groups.is_empty() }
}
