//! Notification fan-out.
//!
//! A [`Fanout`] registry maps `(model, signal)` to a [`Rule`]. When a store
//! fires a signal for a saved or deleted instance it asks the registry for a
//! [`Dispatch`]: the notification rows to insert inside the same transaction
//! as the triggering write. All rows of one dispatch share a correlation id.
//!
//! Rule paths are dotted attribute chains evaluated against the instance,
//! e.g. `question.creator` on an answer. Intermediate hops that leave the
//! instance are resolved through a [`Lookup`] supplied by the store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error,
  access::ADMIN_GROUP,
  model::{Model, ModelKind, Relation, Target},
  notification::{Event, GroupNotification, UserNotification},
  user::UserId,
};

// ─── Signals ─────────────────────────────────────────────────────────────────

/// Hook points a store fires around every explicit write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signal {
  PreSave,
  PostSave,
  PreDelete,
  PostDelete,
}

impl Event {
  /// Map a fired signal to the event it reports. `created` distinguishes an
  /// insert from an update on `PostSave`.
  ///
  /// Pre-write signals carry no event; a rule attached to one is a
  /// programming error and fails the write.
  pub fn from_signal(signal: Signal, created: bool) -> crate::Result<Self> {
    match signal {
      Signal::PostSave if created => Ok(Self::Created),
      Signal::PostSave => Ok(Self::Changed),
      Signal::PostDelete => Ok(Self::Deleted),
      other => Err(Error::UnknownSignal(other)),
    }
  }
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

/// Read access to the store from inside a write, used to follow rule paths
/// and to load nested collections.
pub trait Lookup {
  type Error: From<Error>;

  /// Attribute `field` of the stored entity `target`. `Ok(None)` if the
  /// entity no longer exists.
  fn related(
    &self,
    target: Target,
    field: &str,
  ) -> Result<Option<Relation>, Self::Error>;

  /// Every `C` whose `field` column equals `parent`, in creation order.
  fn children<C: Model>(
    &self,
    field: &str,
    parent: i64,
  ) -> Result<Vec<C>, Self::Error>;

  /// Names of the groups `user` belongs to.
  fn groups_of(&self, user: UserId) -> Result<Vec<String>, Self::Error>;

  fn group_exists(&self, name: &str) -> Result<bool, Self::Error>;
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Who is notified when a rule fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
  /// Dotted attribute paths that resolve to a user.
  pub users:  Vec<String>,
  /// Literal group names.
  pub groups: Vec<String>,
}

impl Rule {
  pub fn new() -> Self { Self::default() }

  pub fn user(mut self, path: impl Into<String>) -> Self {
    self.users.push(path.into());
    self
  }

  pub fn group(mut self, name: impl Into<String>) -> Self {
    self.groups.push(name.into());
    self
  }
}

/// The rows one fired rule produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
  pub uuid:   Uuid,
  pub users:  Vec<UserNotification>,
  pub groups: Vec<GroupNotification>,
}

impl Dispatch {
  pub fn len(&self) -> usize { self.users.len() + self.groups.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Registry of fan-out rules, keyed by model and signal.
#[derive(Debug, Clone, Default)]
pub struct Fanout {
  rules: HashMap<(ModelKind, Signal), Rule>,
}

impl Fanout {
  /// An empty registry; no writes produce notifications.
  pub fn new() -> Self { Self::default() }

  /// The portal's default rules. Every watched entity notifies on save.
  pub fn standard() -> Self {
    let mut fanout = Self::new();
    let on_save = [
      (ModelKind::Answer, Rule::new().user("question.creator")),
      (ModelKind::Appointment, Rule::new().user("patient").user("staff")),
      (
        ModelKind::AppointmentRequest,
        Rule::new().user("staff").group(ADMIN_GROUP),
      ),
      (ModelKind::Prescription, Rule::new().user("patient")),
      (
        ModelKind::PrescriptionRequest,
        Rule::new().user("prescription.creator").group(ADMIN_GROUP),
      ),
      (ModelKind::Question, Rule::new().group(ADMIN_GROUP)),
      (ModelKind::Result, Rule::new().user("patient")),
    ];
    for (model, rule) in on_save {
      fanout.register(model, Signal::PostSave, rule);
    }
    fanout
  }

  /// Attach `rule` to `(model, signal)`, replacing and returning any rule
  /// already registered there.
  pub fn register(
    &mut self,
    model: ModelKind,
    signal: Signal,
    rule: Rule,
  ) -> Option<Rule> {
    self.rules.insert((model, signal), rule)
  }

  pub fn rule(&self, model: ModelKind, signal: Signal) -> Option<&Rule> {
    self.rules.get(&(model, signal))
  }

  /// Plan the notifications for `instance` after `signal` fired.
  ///
  /// Returns `Ok(None)` when no rule is registered. Paths resolving to an
  /// unset user are skipped. Unknown groups and unmapped signals are errors.
  pub fn plan<M: Model, L: Lookup>(
    &self,
    instance: &M,
    signal: Signal,
    created: bool,
    lookup: &L,
    now: DateTime<Utc>,
  ) -> Result<Option<Dispatch>, L::Error> {
    let Some(rule) = self.rule(M::KIND, signal) else {
      return Ok(None);
    };
    let event = Event::from_signal(signal, created)?;
    let target = instance
      .target()
      .ok_or_else(|| Error::UnregisteredTarget(M::KIND.name().to_owned()))?;
    let uuid = Uuid::new_v4();
    let target_name = M::KIND.name().to_owned();

    let mut users = Vec::with_capacity(rule.users.len());
    for path in &rule.users {
      let Some(user) = resolve_user(instance, path, lookup)? else {
        debug!(model = %M::KIND, %path, "fan-out path resolved to nobody");
        continue;
      };
      users.push(UserNotification {
        id: 0,
        uuid,
        target,
        target_name: target_name.clone(),
        event,
        read: false,
        creation_date: now,
        user,
      });
    }

    let mut groups = Vec::with_capacity(rule.groups.len());
    for name in &rule.groups {
      if !lookup.group_exists(name)? {
        return Err(Error::UnknownGroup(name.clone()).into());
      }
      groups.push(GroupNotification {
        id: 0,
        uuid,
        target,
        target_name: target_name.clone(),
        event,
        read: false,
        creation_date: now,
        group: name.clone(),
      });
    }

    debug!(
      model = %M::KIND,
      id = instance.id(),
      %event,
      %uuid,
      users = users.len(),
      groups = groups.len(),
      "planned fan-out"
    );
    Ok(Some(Dispatch { uuid, users, groups }))
  }
}

/// Follow a dotted path from `instance` to a user id.
fn resolve_user<M: Model, L: Lookup>(
  instance: &M,
  path: &str,
  lookup: &L,
) -> Result<Option<UserId>, L::Error> {
  let bad_path = || Error::BadPath {
    model: M::KIND.name(),
    path:  path.to_owned(),
  };

  let mut segments = path.split('.');
  let first = segments.next().unwrap_or_default();
  let mut current = instance.relation(first).ok_or_else(bad_path)?;

  for segment in segments {
    let Relation::Entity(target) = current else {
      return Err(bad_path().into());
    };
    match lookup.related(target, segment)? {
      Some(next) => current = next,
      None => return Ok(None),
    }
  }

  match current {
    Relation::User(user) => Ok(user),
    Relation::Entity(_) => Err(bad_path().into()),
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;
  use crate::entity::{Answer, AppointmentRequest, Question};

  /// One stored question (id 1, created by user 7) and an `admin` group.
  struct Fixture;

  impl Lookup for Fixture {
    type Error = Error;

    fn related(
      &self,
      target: Target,
      field: &str,
    ) -> crate::Result<Option<Relation>> {
      match (target, field) {
        (Target::Question(1), "creator") => Ok(Some(Relation::User(Some(7)))),
        (Target::Question(_), "creator") => Ok(None),
        _ => Err(Error::BadPath { model: "question", path: field.into() }),
      }
    }

    fn children<C: Model>(
      &self,
      _field: &str,
      _parent: i64,
    ) -> crate::Result<Vec<C>> {
      Ok(Vec::new())
    }

    fn groups_of(&self, _user: UserId) -> crate::Result<Vec<String>> {
      Ok(Vec::new())
    }

    fn group_exists(&self, name: &str) -> crate::Result<bool> {
      Ok(name == ADMIN_GROUP)
    }
  }

  fn answer(question: i64) -> Answer {
    let now = Utc::now();
    Answer {
      id: 4,
      message: "baz".into(),
      unread: true,
      question,
      creator: 2,
      creation_date: now,
      modification_date: now,
    }
  }

  fn request(staff: Option<UserId>) -> AppointmentRequest {
    let now = Utc::now();
    AppointmentRequest {
      id: 9,
      start_date: now,
      end_date: now,
      subject: String::new(),
      message: String::new(),
      staff,
      creator: 3,
      creation_date: now,
      modification_date: now,
    }
  }

  #[test]
  fn event_mapping() {
    assert_eq!(Event::from_signal(Signal::PostSave, true).unwrap(), Event::Created);
    assert_eq!(Event::from_signal(Signal::PostSave, false).unwrap(), Event::Changed);
    assert_eq!(Event::from_signal(Signal::PostDelete, false).unwrap(), Event::Deleted);
    for signal in [Signal::PreSave, Signal::PreDelete] {
      assert!(matches!(
        Event::from_signal(signal, true),
        Err(Error::UnknownSignal(s)) if s == signal
      ));
    }
  }

  #[test]
  fn nested_path_reaches_question_creator() {
    let dispatch = Fanout::standard()
      .plan(&answer(1), Signal::PostSave, true, &Fixture, Utc::now())
      .unwrap()
      .unwrap();
    assert_eq!(dispatch.users.len(), 1);
    assert!(dispatch.groups.is_empty());

    let n = &dispatch.users[0];
    assert_eq!(n.user, 7);
    assert_eq!(n.target, Target::Answer(4));
    assert_eq!(n.target_name, "answer");
    assert_eq!(n.event, Event::Created);
    assert!(!n.read);
  }

  #[test]
  fn unassigned_staff_yields_only_group_notification() {
    let dispatch = Fanout::standard()
      .plan(&request(None), Signal::PostSave, true, &Fixture, Utc::now())
      .unwrap()
      .unwrap();
    assert!(dispatch.users.is_empty());
    assert_eq!(dispatch.groups.len(), 1);
    assert_eq!(dispatch.groups[0].group, "admin");
  }

  #[test]
  fn one_correlation_id_per_event() {
    let fanout = Fanout::standard();
    let first = fanout
      .plan(&request(Some(5)), Signal::PostSave, false, &Fixture, Utc::now())
      .unwrap()
      .unwrap();
    assert_eq!(first.len(), 2);
    let ids: HashSet<Uuid> = first
      .users
      .iter()
      .map(|n| n.uuid)
      .chain(first.groups.iter().map(|n| n.uuid))
      .collect();
    assert_eq!(ids, HashSet::from([first.uuid]));
    assert_eq!(first.users[0].event, Event::Changed);

    let second = fanout
      .plan(&request(Some(5)), Signal::PostSave, false, &Fixture, Utc::now())
      .unwrap()
      .unwrap();
    assert_ne!(first.uuid, second.uuid);
  }

  #[test]
  fn unregistered_pairs_plan_nothing() {
    let fanout = Fanout::standard();
    let planned = fanout
      .plan(&answer(1), Signal::PostDelete, false, &Fixture, Utc::now())
      .unwrap();
    assert!(planned.is_none());
  }

  #[test]
  fn rule_on_pre_signal_fails() {
    let mut fanout = Fanout::new();
    fanout.register(ModelKind::Answer, Signal::PreSave, Rule::new().user("creator"));
    assert!(matches!(
      fanout.plan(&answer(1), Signal::PreSave, true, &Fixture, Utc::now()),
      Err(Error::UnknownSignal(Signal::PreSave))
    ));
  }

  #[test]
  fn unknown_group_fails() {
    let mut fanout = Fanout::new();
    fanout.register(ModelKind::Answer, Signal::PostSave, Rule::new().group("nurses"));
    assert!(matches!(
      fanout.plan(&answer(1), Signal::PostSave, true, &Fixture, Utc::now()),
      Err(Error::UnknownGroup(g)) if g == "nurses"
    ));
  }

  #[test]
  fn register_replaces_existing_rule() {
    let mut fanout = Fanout::standard();
    let old = fanout.register(
      ModelKind::Question,
      Signal::PostSave,
      Rule::new().user("creator"),
    );
    assert_eq!(old, Some(Rule::new().group("admin")));

    let question = Question {
      id: 1,
      subject: "foo".into(),
      message: "bar".into(),
      creator: 3,
      creation_date: Utc::now(),
      modification_date: Utc::now(),
      answers: Vec::new(),
    };
    let dispatch = fanout
      .plan(&question, Signal::PostSave, true, &Fixture, Utc::now())
      .unwrap()
      .unwrap();
    assert_eq!(dispatch.users.len(), 1);
    assert!(dispatch.groups.is_empty());
  }

  #[test]
  fn deleted_intermediate_resolves_to_nobody() {
    let dispatch = Fanout::standard()
      .plan(&answer(2), Signal::PostSave, true, &Fixture, Utc::now())
      .unwrap()
      .unwrap();
    assert!(dispatch.is_empty());
  }

  #[test]
  fn bad_paths_are_errors() {
    let mut fanout = Fanout::new();
    fanout.register(ModelKind::Answer, Signal::PostSave, Rule::new().user("question"));
    assert!(matches!(
      fanout.plan(&answer(1), Signal::PostSave, true, &Fixture, Utc::now()),
      Err(Error::BadPath { .. })
    ));

    fanout.register(ModelKind::Answer, Signal::PostSave, Rule::new().user("nope"));
    assert!(matches!(
      fanout.plan(&answer(1), Signal::PostSave, true, &Fixture, Utc::now()),
      Err(Error::BadPath { .. })
    ));
  }
}
