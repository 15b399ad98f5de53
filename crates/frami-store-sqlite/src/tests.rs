//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::Utc;
use serde_json::json;

use frami_core::{
  access::{Permission, Verb},
  entity::{
    Answer, Appointment, AppointmentRequest, Prescription, PrescriptionRequest,
    Question,
  },
  fanout::{Fanout, Rule, Signal},
  groups::GroupTable,
  model::{Create, Model, ModelKind, Target},
  notification::{Event, GroupNotification, UserNotification},
  payload::Payload,
  scope::{Clause, Filter},
  store::{PortalStore, StoreError},
  user::{SENTINEL_USERNAME, User},
};

use crate::{Error, SqliteStore};

async fn bare_store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn store() -> SqliteStore {
  let s = bare_store().await;
  s.provision_groups(GroupTable::standard().unwrap())
    .await
    .unwrap();
  s
}

async fn user(s: &SqliteStore, name: &str, groups: &[&str]) -> User {
  let mut u = User::new(name, Utc::now());
  u.password = "unused".into();
  u.groups = groups.iter().map(|g| g.to_string()).collect();
  s.create_user(u).await.unwrap()
}

fn payload(v: serde_json::Value) -> Payload { serde_json::from_value(v).unwrap() }

fn new_appointment(creator: i64, patient: i64, staff: i64) -> Appointment {
  let now = Utc::now();
  Appointment::create(
    &payload(json!({
      "creator":    creator,
      "patient":    patient,
      "staff":      staff,
      "start_date": now.to_rfc3339(),
      "end_date":   now.to_rfc3339(),
    })),
    now,
  )
  .unwrap()
}

fn new_prescription(creator: i64, patient: i64) -> Prescription {
  Prescription::create(
    &payload(json!({
      "creator":    creator,
      "patient":    patient,
      "medication": "foo",
      "quantity":   "bar",
    })),
    Utc::now(),
  )
  .unwrap()
}

fn new_question(creator: i64) -> Question {
  Question::create(
    &payload(json!({ "creator": creator, "subject": "foo", "message": "bar" })),
    Utc::now(),
  )
  .unwrap()
}

async fn user_notes(s: &SqliteStore) -> Vec<UserNotification> {
  s.list(Filter::all()).await.unwrap()
}

async fn group_notes(s: &SqliteStore) -> Vec<GroupNotification> {
  s.list(Filter::all()).await.unwrap()
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_assigns_ids_in_creation_order() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;

  let first = s.insert(new_prescription(admin.id, p.id)).await.unwrap();
  let second = s.insert(new_prescription(admin.id, p.id)).await.unwrap();
  assert!(first.id > 0);
  assert!(second.id > first.id);

  let all: Vec<Prescription> = s.list(Filter::all()).await.unwrap();
  assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), [first.id, second.id]);
}

#[tokio::test]
async fn get_respects_filter() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p1 = user(&s, "p1", &["patient"]).await;
  let p2 = user(&s, "p2", &["patient"]).await;
  let a = s.insert(new_appointment(admin.id, p1.id, admin.id)).await.unwrap();

  let own = Filter::all().and(Clause::equals("patient", p1.id));
  let other = Filter::all().and(Clause::equals("patient", p2.id));
  assert!(s.get::<Appointment>(a.id, own).await.unwrap().is_some());
  assert!(s.get::<Appointment>(a.id, other).await.unwrap().is_none());
  assert!(s.get::<Appointment>(a.id + 1, Filter::all()).await.unwrap().is_none());
}

#[tokio::test]
async fn question_loads_its_answers() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;
  let q = s.insert(new_question(p.id)).await.unwrap();

  let answer = Answer::create(
    &payload(json!({ "creator": admin.id, "message": "baz", "question": q.id })),
    Utc::now(),
  )
  .unwrap();
  s.insert(answer).await.unwrap();

  let q: Question = s.get(q.id, Filter::all()).await.unwrap().unwrap();
  assert_eq!(q.answers.len(), 1);
  assert_eq!(q.answers[0].message, "baz");
  assert!(q.answers[0].unread);
}

#[tokio::test]
async fn prescription_loads_its_refill_requests() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;
  let rx = s.insert(new_prescription(admin.id, p.id)).await.unwrap();
  assert!(rx.refill_requests.is_empty());

  let refill = PrescriptionRequest::create(
    &payload(json!({ "creator": p.id, "prescription": rx.id })),
    Utc::now(),
  )
  .unwrap();
  let refill = s.insert(refill).await.unwrap();

  let rx: Prescription = s.get(rx.id, Filter::all()).await.unwrap().unwrap();
  assert_eq!(rx.refill_requests, [refill]);
}

#[tokio::test]
async fn dangling_references_are_validation_errors() {
  let s = store().await;
  let p = user(&s, "p", &["patient"]).await;

  let err = s.insert(new_appointment(p.id, 999, p.id)).await.unwrap_err();
  let errors = err.into_validation().unwrap();
  assert_eq!(errors.codes("patient"), ["does_not_exist"]);
  assert_eq!(errors.codes("staff"), ["does_not_exist"], "staff must be an admin");
  assert!(errors.get("creator").is_none());
}

#[tokio::test]
async fn staff_flag_counts_as_admin_membership() {
  let s = store().await;
  let p = user(&s, "p", &["patient"]).await;
  let mut nurse = User::new("nurse", Utc::now());
  nurse.password = "unused".into();
  nurse.is_staff = true;
  let nurse = s.create_user(nurse).await.unwrap();

  assert!(s.insert(new_appointment(nurse.id, p.id, nurse.id)).await.is_ok());
}

// ─── Fan-out ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn appointment_notifies_patient_and_staff() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;
  let a = s.insert(new_appointment(admin.id, p.id, admin.id)).await.unwrap();

  let notes = user_notes(&s).await;
  assert_eq!(notes.len(), 2);
  assert_eq!(notes[0].uuid, notes[1].uuid);
  assert_eq!(
    notes.iter().map(|n| n.user).collect::<Vec<_>>(),
    [p.id, admin.id]
  );
  assert!(notes.iter().all(|n| n.event == Event::Created
    && n.target == Target::Appointment(a.id)
    && n.target_name == "appointment"
    && !n.read));
  assert!(group_notes(&s).await.is_empty());

  let mut changed = a.clone();
  changed.note = "bring results".into();
  s.save(changed).await.unwrap();

  let notes = user_notes(&s).await;
  assert_eq!(notes.len(), 4);
  assert!(notes[2..].iter().all(|n| n.event == Event::Changed));
  assert_ne!(notes[0].uuid, notes[2].uuid);
}

#[tokio::test]
async fn unassigned_request_notifies_admin_group_only() {
  let s = store().await;
  let p = user(&s, "p", &["patient"]).await;
  let now = Utc::now().to_rfc3339();
  let req = AppointmentRequest::create(
    &payload(json!({ "creator": p.id, "start_date": now, "end_date": now })),
    Utc::now(),
  )
  .unwrap();
  let req = s.insert(req).await.unwrap();

  assert!(user_notes(&s).await.is_empty());
  let groups = group_notes(&s).await;
  assert_eq!(groups.len(), 1);
  assert_eq!(groups[0].group, "admin");
  assert_eq!(groups[0].target, Target::AppointmentRequest(req.id));
}

#[tokio::test]
async fn answer_notifies_question_author() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;
  let q = s.insert(new_question(p.id)).await.unwrap();
  assert_eq!(group_notes(&s).await.len(), 1);

  let answer = Answer::create(
    &payload(json!({ "creator": admin.id, "message": "baz", "question": q.id })),
    Utc::now(),
  )
  .unwrap();
  let answer = s.insert(answer).await.unwrap();

  let notes = user_notes(&s).await;
  assert_eq!(notes.len(), 1);
  assert_eq!(notes[0].user, p.id);
  assert_eq!(notes[0].target, Target::Answer(answer.id));
}

#[tokio::test]
async fn failed_fanout_rolls_back_the_write() {
  // No groups provisioned, so the question rule's `admin` group is unknown.
  let s = bare_store().await;
  let p = user(&s, "p", &[]).await;

  let err = s.insert(new_question(p.id)).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(frami_core::Error::UnknownGroup(ref g)) if g == "admin"
  ));
  let questions: Vec<Question> = s.list(Filter::all()).await.unwrap();
  assert!(questions.is_empty());
}

#[tokio::test]
async fn rule_on_pre_save_fails_the_write() {
  let mut fanout = Fanout::new();
  fanout.register(ModelKind::Prescription, Signal::PreSave, Rule::new().user("patient"));
  let s = store().await.with_fanout(fanout);
  let admin = user(&s, "admin", &["admin"]).await;

  let err = s.insert(new_prescription(admin.id, admin.id)).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(frami_core::Error::UnknownSignal(Signal::PreSave))
  ));
  let all: Vec<Prescription> = s.list(Filter::all()).await.unwrap();
  assert!(all.is_empty());
}

#[tokio::test]
async fn delete_rule_reports_deleted() {
  let mut fanout = Fanout::new();
  fanout.register(ModelKind::Prescription, Signal::PostDelete, Rule::new().user("patient"));
  let s = store().await.with_fanout(fanout);
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;

  let rx = s.insert(new_prescription(admin.id, p.id)).await.unwrap();
  assert!(user_notes(&s).await.is_empty());
  s.delete(rx.clone()).await.unwrap();

  let notes = user_notes(&s).await;
  assert_eq!(notes.len(), 1);
  assert_eq!(notes[0].event, Event::Deleted);
  assert_eq!(notes[0].target, Target::Prescription(rx.id));
  assert!(s.resolve(notes[0].target).await.unwrap().is_none());
}

#[tokio::test]
async fn notification_read_flag_persists() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;
  s.insert(new_prescription(admin.id, p.id)).await.unwrap();

  let before = user_notes(&s).await.remove(0);
  let mut after = before.clone();
  after
    .apply(&payload(json!({ "read": true, "event": "deleted" })), true, Utc::now())
    .unwrap();
  s.save(after).await.unwrap();

  let stored = user_notes(&s).await.remove(0);
  assert!(stored.read);
  assert_eq!(UserNotification { read: false, ..stored }, before);
}

#[tokio::test]
async fn resolve_embeds_live_targets() {
  let s = store().await;
  let p = user(&s, "p", &["patient"]).await;
  let q = s.insert(new_question(p.id)).await.unwrap();

  let json = s.resolve(Target::Question(q.id)).await.unwrap().unwrap();
  assert_eq!(json["subject"], "foo");
  assert_eq!(json["answers"], json!([]));
  assert!(s.resolve(Target::Answer(42)).await.unwrap().is_none());
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_username_is_rejected() {
  let s = store().await;
  user(&s, "alice", &[]).await;

  let mut dup = User::new("alice", Utc::now());
  dup.password = "unused".into();
  let errors = s.create_user(dup).await.unwrap_err().into_validation().unwrap();
  assert_eq!(errors.codes("username"), ["unique"]);
}

#[tokio::test]
async fn unknown_group_membership_is_rejected() {
  let s = store().await;
  let mut u = User::new("bob", Utc::now());
  u.password = "unused".into();
  u.groups = vec!["nurses".into()];
  let errors = s.create_user(u).await.unwrap_err().into_validation().unwrap();
  assert_eq!(errors.codes("groups"), ["does_not_exist"]);
}

#[tokio::test]
async fn user_loads_groups_and_prescriptions() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;
  s.insert(new_prescription(admin.id, p.id)).await.unwrap();

  let p: User = s.get(p.id, Filter::all()).await.unwrap().unwrap();
  assert_eq!(p.groups, ["patient"]);
  assert_eq!(p.prescriptions.len(), 1);

  let mut renamed = p.clone();
  renamed.groups = vec!["admin".into(), "patient".into()];
  let saved = s.save_user(renamed).await.unwrap();
  assert_eq!(saved.groups, ["admin", "patient"]);
}

#[tokio::test]
async fn credentials_union_group_permissions() {
  let s = store().await;
  let mut nurse = User::new("nurse", Utc::now());
  nurse.password = "$argon2id$hash".into();
  nurse.is_staff = true;
  nurse.groups = vec!["patient".into()];
  s.create_user(nurse).await.unwrap();

  let creds = s.credentials("nurse".into()).await.unwrap().unwrap();
  assert_eq!(creds.password_hash, "$argon2id$hash");
  assert!(creds.principal.in_group("admin"));
  assert!(creds.principal.in_group("patient"));
  assert!(creds.principal.has_perm(Permission::new(Verb::Add, ModelKind::Question)));
  assert!(creds.principal.has_perm(Permission::new(Verb::Add, ModelKind::Result)));

  assert!(s.credentials("nobody".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_a_user_cascades_owned_rows_and_reassigns_authored_ones() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;
  let a = s.insert(new_appointment(admin.id, p.id, admin.id)).await.unwrap();
  let rx = s.insert(new_prescription(admin.id, p.id)).await.unwrap();
  let q = s.insert(new_question(p.id)).await.unwrap();

  s.delete_user(admin.id).await.unwrap();
  let sentinel = s
    .credentials(SENTINEL_USERNAME.into())
    .await
    .unwrap()
    .unwrap()
    .principal;
  assert!(sentinel.groups.is_empty());

  let a: Appointment = s.get(a.id, Filter::all()).await.unwrap().unwrap();
  assert_eq!((a.staff, a.creator), (sentinel.id, sentinel.id));
  let rx: Prescription = s.get(rx.id, Filter::all()).await.unwrap().unwrap();
  assert_eq!(rx.creator, sentinel.id);
  assert!(user_notes(&s).await.iter().all(|n| n.user != admin.id));

  s.delete_user(p.id).await.unwrap();
  assert!(s.get::<Appointment>(a.id, Filter::all()).await.unwrap().is_none());
  assert!(s.get::<Prescription>(rx.id, Filter::all()).await.unwrap().is_none());
  assert!(s.get::<Question>(q.id, Filter::all()).await.unwrap().is_none());
  assert!(user_notes(&s).await.is_empty());
}

#[tokio::test]
async fn sentinel_cannot_be_deleted() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  s.delete_user(admin.id).await.unwrap();

  let sentinel = s
    .credentials(SENTINEL_USERNAME.into())
    .await
    .unwrap()
    .unwrap()
    .principal;
  let errors = s
    .delete_user(sentinel.id)
    .await
    .unwrap_err()
    .into_validation()
    .unwrap();
  assert_eq!(errors.codes("username"), ["protected"]);
}

#[tokio::test]
async fn reassigned_rows_stay_editable() {
  let s = store().await;
  let admin = user(&s, "admin", &["admin"]).await;
  let p = user(&s, "p", &["patient"]).await;
  let a = s.insert(new_appointment(admin.id, p.id, admin.id)).await.unwrap();
  s.delete_user(admin.id).await.unwrap();

  let mut a: Appointment = s.get(a.id, Filter::all()).await.unwrap().unwrap();
  let sentinel = a.staff;
  a.apply(&payload(json!({ "note": "moved" })), true, Utc::now())
    .unwrap();
  let saved = s.save(a.clone()).await.unwrap();
  assert_eq!(saved.note, "moved");
  assert_eq!(saved.staff, sentinel);

  // A reference that does change is still checked.
  a.apply(&payload(json!({ "staff": p.id })), true, Utc::now())
    .unwrap();
  let errors = s.save(a).await.unwrap_err().into_validation().unwrap();
  assert_eq!(errors.codes("staff"), ["does_not_exist"]);
}

#[tokio::test]
async fn sentinel_username_is_reserved() {
  let s = store().await;
  let mut squatter = User::new(SENTINEL_USERNAME, Utc::now());
  squatter.password = "unused".into();
  let errors =
    s.create_user(squatter).await.unwrap_err().into_validation().unwrap();
  assert_eq!(errors.codes("username"), ["reserved"]);

  let mut alice = user(&s, "alice", &[]).await;
  alice.username = SENTINEL_USERNAME.into();
  let errors = s.save_user(alice).await.unwrap_err().into_validation().unwrap();
  assert_eq!(errors.codes("username"), ["reserved"]);
}

#[tokio::test]
async fn provisioning_is_idempotent() {
  let s = store().await;
  let table = GroupTable::new()
    .with_codenames("admin", &["view_result"])
    .unwrap();
  s.provision_groups(table).await.unwrap();
  s.provision_groups(GroupTable::standard().unwrap()).await.unwrap();

  let admin = user(&s, "admin", &["admin"]).await;
  let creds = s.credentials(admin.username.clone()).await.unwrap().unwrap();
  assert!(creds.principal.has_perm(Permission::new(Verb::Add, ModelKind::Appointment)));
  assert_eq!(creds.principal.permissions.len(), 25);
}
