//! Domain entities: appointments, prescriptions, questions and lab results.
//!
//! Every entity carries a `creator` stamped by the request layer on create.
//! The creator is immutable afterwards; update payloads naming it are
//! accepted and ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  access::ADMIN_GROUP,
  fanout::Lookup,
  model::{Create, Model, ModelKind, Reference, Relation, Row, Target, Value},
  payload::{Payload, ValidationErrors},
  user::UserId,
};

/// Read the stamped creator and build an instance through [`Model::apply`]
/// so create and full update share one rule set.
fn create_with<M: Model>(
  payload: &Payload,
  now: DateTime<Utc>,
  blank: impl FnOnce(UserId) -> M,
) -> Result<M, ValidationErrors> {
  let mut errors = ValidationErrors::new();
  let creator = payload.int(&mut errors, "creator", true);
  let mut new = blank(creator.unwrap_or_default());
  if let Err(e) = new.apply(payload, false, now) {
    errors.merge(e);
  }
  errors.finish(new)
}

// ─── Appointment ─────────────────────────────────────────────────────────────

/// A scheduled visit between a patient and a staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
  pub id:                i64,
  pub start_date:        DateTime<Utc>,
  pub end_date:          DateTime<Utc>,
  pub note:              String,
  pub patient:           UserId,
  /// Must be a member of the admin group.
  pub staff:             UserId,
  pub creator:           UserId,
  pub creation_date:     DateTime<Utc>,
  pub modification_date: DateTime<Utc>,
}

impl Model for Appointment {
  const KIND: ModelKind = ModelKind::Appointment;
  const FIELDS: &'static [&'static str] = &[
    "start_date",
    "end_date",
    "note",
    "patient",
    "staff",
    "creator",
    "creation_date",
    "modification_date",
  ];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "start_date" => self.start_date.into(),
      "end_date" => self.end_date.into(),
      "note" => self.note.as_str().into(),
      "patient" => self.patient.into(),
      "staff" => self.staff.into(),
      "creator" => self.creator.into(),
      "creation_date" => self.creation_date.into(),
      "modification_date" => self.modification_date.into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:                row.int("id")?,
      start_date:        row.time("start_date")?,
      end_date:          row.time("end_date")?,
      note:              row.text("note")?,
      patient:           row.int("patient")?,
      staff:             row.int("staff")?,
      creator:           row.int("creator")?,
      creation_date:     row.time("creation_date")?,
      modification_date: row.time("modification_date")?,
    })
  }

  fn relation(&self, field: &str) -> Option<Relation> {
    match field {
      "patient" => Some(Relation::User(Some(self.patient))),
      "staff" => Some(Relation::User(Some(self.staff))),
      "creator" => Some(Relation::User(Some(self.creator))),
      _ => None,
    }
  }

  fn references(&self) -> Vec<Reference> {
    vec![
      Reference::user("patient", self.patient),
      Reference::member("staff", self.staff, ADMIN_GROUP),
      Reference::user("creator", self.creator),
    ]
  }

  fn apply(
    &mut self,
    payload: &Payload,
    partial: bool,
    now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let required = !partial;
    if let Some(v) = payload.time(&mut errors, "start_date", required) {
      self.start_date = v;
    }
    if let Some(v) = payload.time(&mut errors, "end_date", required) {
      self.end_date = v;
    }
    if let Some(v) = payload.text(&mut errors, "note", false) {
      self.note = v;
    }
    if let Some(v) = payload.int(&mut errors, "patient", required) {
      self.patient = v;
    }
    if let Some(v) = payload.int(&mut errors, "staff", required) {
      self.staff = v;
    }
    self.modification_date = now;
    errors.finish(())
  }
}

impl Create for Appointment {
  fn create(
    payload: &Payload,
    now: DateTime<Utc>,
  ) -> Result<Self, ValidationErrors> {
    create_with(payload, now, |creator| Self {
      id: 0,
      start_date: now,
      end_date: now,
      note: String::new(),
      patient: 0,
      staff: 0,
      creator,
      creation_date: now,
      modification_date: now,
    })
  }
}

// ─── AppointmentRequest ──────────────────────────────────────────────────────

/// A patient's request for an appointment; staff may be assigned later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRequest {
  pub id:                i64,
  pub start_date:        DateTime<Utc>,
  pub end_date:          DateTime<Utc>,
  pub subject:           String,
  pub message:           String,
  pub staff:             Option<UserId>,
  pub creator:           UserId,
  pub creation_date:     DateTime<Utc>,
  pub modification_date: DateTime<Utc>,
}

impl Model for AppointmentRequest {
  const KIND: ModelKind = ModelKind::AppointmentRequest;
  const FIELDS: &'static [&'static str] = &[
    "start_date",
    "end_date",
    "subject",
    "message",
    "staff",
    "creator",
    "creation_date",
    "modification_date",
  ];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "start_date" => self.start_date.into(),
      "end_date" => self.end_date.into(),
      "subject" => self.subject.as_str().into(),
      "message" => self.message.as_str().into(),
      "staff" => self.staff.into(),
      "creator" => self.creator.into(),
      "creation_date" => self.creation_date.into(),
      "modification_date" => self.modification_date.into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:                row.int("id")?,
      start_date:        row.time("start_date")?,
      end_date:          row.time("end_date")?,
      subject:           row.text("subject")?,
      message:           row.text("message")?,
      staff:             row.opt_int("staff")?,
      creator:           row.int("creator")?,
      creation_date:     row.time("creation_date")?,
      modification_date: row.time("modification_date")?,
    })
  }

  fn relation(&self, field: &str) -> Option<Relation> {
    match field {
      "staff" => Some(Relation::User(self.staff)),
      "creator" => Some(Relation::User(Some(self.creator))),
      _ => None,
    }
  }

  fn references(&self) -> Vec<Reference> {
    let mut refs = vec![Reference::user("creator", self.creator)];
    if let Some(staff) = self.staff {
      refs.push(Reference::member("staff", staff, ADMIN_GROUP));
    }
    refs
  }

  fn apply(
    &mut self,
    payload: &Payload,
    partial: bool,
    now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let required = !partial;
    if let Some(v) = payload.time(&mut errors, "start_date", required) {
      self.start_date = v;
    }
    if let Some(v) = payload.time(&mut errors, "end_date", required) {
      self.end_date = v;
    }
    if let Some(v) = payload.text(&mut errors, "subject", false) {
      self.subject = v;
    }
    if let Some(v) = payload.text(&mut errors, "message", false) {
      self.message = v;
    }
    if let Some(v) = payload.opt_int(&mut errors, "staff") {
      self.staff = v;
    }
    self.modification_date = now;
    errors.finish(())
  }
}

impl Create for AppointmentRequest {
  fn create(
    payload: &Payload,
    now: DateTime<Utc>,
  ) -> Result<Self, ValidationErrors> {
    create_with(payload, now, |creator| Self {
      id: 0,
      start_date: now,
      end_date: now,
      subject: String::new(),
      message: String::new(),
      staff: None,
      creator,
      creation_date: now,
      modification_date: now,
    })
  }
}

// ─── Prescription ────────────────────────────────────────────────────────────

/// A medication prescribed to a patient. `creator` is the prescriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
  pub id:                i64,
  pub medication:        String,
  pub quantity:          String,
  pub note:              String,
  pub patient:           UserId,
  pub creator:           UserId,
  pub creation_date:     DateTime<Utc>,
  pub modification_date: DateTime<Utc>,
  /// Read-only; loaded on fetch, ignored in payloads.
  #[serde(default)]
  pub refill_requests:   Vec<PrescriptionRequest>,
}

impl Model for Prescription {
  const KIND: ModelKind = ModelKind::Prescription;
  const FIELDS: &'static [&'static str] = &[
    "medication",
    "quantity",
    "note",
    "patient",
    "creator",
    "creation_date",
    "modification_date",
  ];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "medication" => self.medication.as_str().into(),
      "quantity" => self.quantity.as_str().into(),
      "note" => self.note.as_str().into(),
      "patient" => self.patient.into(),
      "creator" => self.creator.into(),
      "creation_date" => self.creation_date.into(),
      "modification_date" => self.modification_date.into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:                row.int("id")?,
      medication:        row.text("medication")?,
      quantity:          row.text("quantity")?,
      note:              row.text("note")?,
      patient:           row.int("patient")?,
      creator:           row.int("creator")?,
      creation_date:     row.time("creation_date")?,
      modification_date: row.time("modification_date")?,
      refill_requests:   Vec::new(),
    })
  }

  fn relation(&self, field: &str) -> Option<Relation> {
    match field {
      "patient" => Some(Relation::User(Some(self.patient))),
      "creator" => Some(Relation::User(Some(self.creator))),
      _ => None,
    }
  }

  fn references(&self) -> Vec<Reference> {
    vec![
      Reference::user("patient", self.patient),
      Reference::user("creator", self.creator),
    ]
  }

  fn apply(
    &mut self,
    payload: &Payload,
    partial: bool,
    now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let required = !partial;
    if let Some(v) = payload.text(&mut errors, "medication", required) {
      self.medication = v;
    }
    if let Some(v) = payload.text(&mut errors, "quantity", required) {
      self.quantity = v;
    }
    if let Some(v) = payload.text(&mut errors, "note", false) {
      self.note = v;
    }
    if let Some(v) = payload.int(&mut errors, "patient", required) {
      self.patient = v;
    }
    self.modification_date = now;
    errors.finish(())
  }

  fn hydrate<L: Lookup>(&mut self, lookup: &L) -> Result<(), L::Error> {
    self.refill_requests = lookup.children("prescription", self.id)?;
    Ok(())
  }
}

impl Create for Prescription {
  fn create(
    payload: &Payload,
    now: DateTime<Utc>,
  ) -> Result<Self, ValidationErrors> {
    create_with(payload, now, |creator| Self {
      id: 0,
      medication: String::new(),
      quantity: String::new(),
      note: String::new(),
      patient: 0,
      creator,
      creation_date: now,
      modification_date: now,
      refill_requests: Vec::new(),
    })
  }
}

// ─── PrescriptionRequest ─────────────────────────────────────────────────────

/// A patient's refill request for an existing prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionRequest {
  pub id:                i64,
  pub prescription:      i64,
  pub creator:           UserId,
  pub creation_date:     DateTime<Utc>,
  pub modification_date: DateTime<Utc>,
}

impl Model for PrescriptionRequest {
  const KIND: ModelKind = ModelKind::PrescriptionRequest;
  const FIELDS: &'static [&'static str] =
    &["prescription", "creator", "creation_date", "modification_date"];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "prescription" => self.prescription.into(),
      "creator" => self.creator.into(),
      "creation_date" => self.creation_date.into(),
      "modification_date" => self.modification_date.into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:                row.int("id")?,
      prescription:      row.int("prescription")?,
      creator:           row.int("creator")?,
      creation_date:     row.time("creation_date")?,
      modification_date: row.time("modification_date")?,
    })
  }

  fn relation(&self, field: &str) -> Option<Relation> {
    match field {
      "prescription" => {
        Some(Relation::Entity(Target::Prescription(self.prescription)))
      }
      "creator" => Some(Relation::User(Some(self.creator))),
      _ => None,
    }
  }

  fn references(&self) -> Vec<Reference> {
    vec![
      Reference::entity("prescription", Target::Prescription(self.prescription)),
      Reference::user("creator", self.creator),
    ]
  }

  fn apply(
    &mut self,
    payload: &Payload,
    partial: bool,
    now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Some(v) = payload.int(&mut errors, "prescription", !partial) {
      self.prescription = v;
    }
    self.modification_date = now;
    errors.finish(())
  }
}

impl Create for PrescriptionRequest {
  fn create(
    payload: &Payload,
    now: DateTime<Utc>,
  ) -> Result<Self, ValidationErrors> {
    create_with(payload, now, |creator| Self {
      id: 0,
      prescription: 0,
      creator,
      creation_date: now,
      modification_date: now,
    })
  }
}

// ─── Question ────────────────────────────────────────────────────────────────

/// A patient's question to the care team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
  pub id:                i64,
  pub subject:           String,
  pub message:           String,
  pub creator:           UserId,
  pub creation_date:     DateTime<Utc>,
  pub modification_date: DateTime<Utc>,
  /// Read-only; loaded on fetch, ignored in payloads.
  #[serde(default)]
  pub answers:           Vec<Answer>,
}

impl Model for Question {
  const KIND: ModelKind = ModelKind::Question;
  const FIELDS: &'static [&'static str] = &[
    "subject",
    "message",
    "creator",
    "creation_date",
    "modification_date",
  ];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "subject" => self.subject.as_str().into(),
      "message" => self.message.as_str().into(),
      "creator" => self.creator.into(),
      "creation_date" => self.creation_date.into(),
      "modification_date" => self.modification_date.into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:                row.int("id")?,
      subject:           row.text("subject")?,
      message:           row.text("message")?,
      creator:           row.int("creator")?,
      creation_date:     row.time("creation_date")?,
      modification_date: row.time("modification_date")?,
      answers:           Vec::new(),
    })
  }

  fn relation(&self, field: &str) -> Option<Relation> {
    match field {
      "creator" => Some(Relation::User(Some(self.creator))),
      _ => None,
    }
  }

  fn references(&self) -> Vec<Reference> {
    vec![Reference::user("creator", self.creator)]
  }

  fn apply(
    &mut self,
    payload: &Payload,
    partial: bool,
    now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Some(v) = payload.text(&mut errors, "subject", !partial) {
      self.subject = v;
    }
    if let Some(v) = payload.text(&mut errors, "message", !partial) {
      self.message = v;
    }
    self.modification_date = now;
    errors.finish(())
  }

  fn hydrate<L: Lookup>(&mut self, lookup: &L) -> Result<(), L::Error> {
    self.answers = lookup.children("question", self.id)?;
    Ok(())
  }
}

impl Create for Question {
  fn create(
    payload: &Payload,
    now: DateTime<Utc>,
  ) -> Result<Self, ValidationErrors> {
    create_with(payload, now, |creator| Self {
      id: 0,
      subject: String::new(),
      message: String::new(),
      creator,
      creation_date: now,
      modification_date: now,
      answers: Vec::new(),
    })
  }
}

// ─── Answer ──────────────────────────────────────────────────────────────────

/// A staff reply to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
  pub id:                i64,
  pub message:           String,
  pub unread:            bool,
  pub question:          i64,
  pub creator:           UserId,
  pub creation_date:     DateTime<Utc>,
  pub modification_date: DateTime<Utc>,
}

impl Model for Answer {
  const KIND: ModelKind = ModelKind::Answer;
  const FIELDS: &'static [&'static str] = &[
    "message",
    "unread",
    "question",
    "creator",
    "creation_date",
    "modification_date",
  ];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "message" => self.message.as_str().into(),
      "unread" => self.unread.into(),
      "question" => self.question.into(),
      "creator" => self.creator.into(),
      "creation_date" => self.creation_date.into(),
      "modification_date" => self.modification_date.into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:                row.int("id")?,
      message:           row.text("message")?,
      unread:            row.bool("unread")?,
      question:          row.int("question")?,
      creator:           row.int("creator")?,
      creation_date:     row.time("creation_date")?,
      modification_date: row.time("modification_date")?,
    })
  }

  fn relation(&self, field: &str) -> Option<Relation> {
    match field {
      "question" => Some(Relation::Entity(Target::Question(self.question))),
      "creator" => Some(Relation::User(Some(self.creator))),
      _ => None,
    }
  }

  fn references(&self) -> Vec<Reference> {
    vec![
      Reference::entity("question", Target::Question(self.question)),
      Reference::user("creator", self.creator),
    ]
  }

  fn apply(
    &mut self,
    payload: &Payload,
    partial: bool,
    now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Some(v) = payload.text(&mut errors, "message", !partial) {
      self.message = v;
    }
    if let Some(v) = payload.bool(&mut errors, "unread", false) {
      self.unread = v;
    }
    if let Some(v) = payload.int(&mut errors, "question", !partial) {
      self.question = v;
    }
    self.modification_date = now;
    errors.finish(())
  }
}

impl Create for Answer {
  fn create(
    payload: &Payload,
    now: DateTime<Utc>,
  ) -> Result<Self, ValidationErrors> {
    create_with(payload, now, |creator| Self {
      id: 0,
      message: String::new(),
      unread: true,
      question: 0,
      creator,
      creation_date: now,
      modification_date: now,
    })
  }
}

// ─── LabResult ───────────────────────────────────────────────────────────────

/// A lab result published to a patient (the `result` collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
  pub id:                i64,
  pub kind:              String,
  pub result:            String,
  pub unread:            bool,
  pub patient:           UserId,
  pub creator:           UserId,
  pub creation_date:     DateTime<Utc>,
  pub modification_date: DateTime<Utc>,
}

impl Model for LabResult {
  const KIND: ModelKind = ModelKind::Result;
  const FIELDS: &'static [&'static str] = &[
    "kind",
    "result",
    "unread",
    "patient",
    "creator",
    "creation_date",
    "modification_date",
  ];

  fn id(&self) -> i64 { self.id }

  fn value(&self, field: &str) -> Option<Value> {
    Some(match field {
      "id" => self.id.into(),
      "kind" => self.kind.as_str().into(),
      "result" => self.result.as_str().into(),
      "unread" => self.unread.into(),
      "patient" => self.patient.into(),
      "creator" => self.creator.into(),
      "creation_date" => self.creation_date.into(),
      "modification_date" => self.modification_date.into(),
      _ => return None,
    })
  }

  fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id:                row.int("id")?,
      kind:              row.text("kind")?,
      result:            row.text("result")?,
      unread:            row.bool("unread")?,
      patient:           row.int("patient")?,
      creator:           row.int("creator")?,
      creation_date:     row.time("creation_date")?,
      modification_date: row.time("modification_date")?,
    })
  }

  fn relation(&self, field: &str) -> Option<Relation> {
    match field {
      "patient" => Some(Relation::User(Some(self.patient))),
      "creator" => Some(Relation::User(Some(self.creator))),
      _ => None,
    }
  }

  fn references(&self) -> Vec<Reference> {
    vec![
      Reference::user("patient", self.patient),
      Reference::user("creator", self.creator),
    ]
  }

  fn apply(
    &mut self,
    payload: &Payload,
    partial: bool,
    now: DateTime<Utc>,
  ) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let required = !partial;
    if let Some(v) = payload.text(&mut errors, "kind", required) {
      self.kind = v;
    }
    if let Some(v) = payload.text(&mut errors, "result", required) {
      self.result = v;
    }
    if let Some(v) = payload.bool(&mut errors, "unread", false) {
      self.unread = v;
    }
    if let Some(v) = payload.int(&mut errors, "patient", required) {
      self.patient = v;
    }
    self.modification_date = now;
    errors.finish(())
  }
}

impl Create for LabResult {
  fn create(
    payload: &Payload,
    now: DateTime<Utc>,
  ) -> Result<Self, ValidationErrors> {
    create_with(payload, now, |creator| Self {
      id: 0,
      kind: String::new(),
      result: String::new(),
      unread: true,
      patient: 0,
      creator,
      creation_date: now,
      modification_date: now,
    })
  }
}
