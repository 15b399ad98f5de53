//! [`SqliteStore`]: the SQLite implementation of [`PortalStore`].

use std::{collections::BTreeSet, path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, params_from_iter};
use tracing::{debug, info};

use frami_core::{
  access::{ADMIN_GROUP, Permission, Principal},
  entity::{
    Answer, Appointment, AppointmentRequest, LabResult, Prescription,
    PrescriptionRequest, Question,
  },
  fanout::{Fanout, Lookup, Signal},
  groups::GroupTable,
  model::{Model, Referent, Relation, Row, Target},
  payload::ValidationErrors,
  scope::{Clause, Filter},
  store::{Credentials, PortalStore},
  user::{SENTINEL_USERNAME, User, UserId},
};

use crate::{
  Error, Result,
  encode::{decode_value, encode_value, quote},
  schema::{SCHEMA, SENTINEL_REFERENCES},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A portal store backed by a single SQLite file.
///
/// Cloning is cheap: the connection and the fan-out registry are
/// reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  fanout: Arc<Fanout>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with the default fan-out rules.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, fanout: Arc::new(Fanout::standard()) })
  }

  /// Replace the fan-out registry used by every subsequent write.
  pub fn with_fanout(mut self, fanout: Fanout) -> Self {
    self.fanout = Arc::new(fanout);
    self
  }

  /// Run `work` on the connection thread without a transaction.
  async fn read<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Db<'_>) -> Result<T> + Send + 'static,
  {
    let fanout = Arc::clone(&self.fanout);
    self
      .conn
      .call(move |conn| {
        Ok(work(&Db { conn, fanout: &fanout, now: Utc::now() }))
      })
      .await?
  }

  /// Run `work` inside one transaction, committed only if it succeeds.
  async fn transact<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Db<'_>) -> Result<T> + Send + 'static,
  {
    let fanout = Arc::clone(&self.fanout);
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let outcome = work(&Db { conn: &tx, fanout: &fanout, now: Utc::now() });
        if outcome.is_ok() {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?
  }
}

// ─── Connection-side operations ──────────────────────────────────────────────

/// Synchronous view of the database from the connection thread; also the
/// [`Lookup`] handed to the fan-out planner.
struct Db<'a> {
  conn:   &'a Connection,
  fanout: &'a Fanout,
  now:    DateTime<Utc>,
}

fn columns<M: Model>() -> impl Iterator<Item = &'static str> {
  std::iter::once("id").chain(M::FIELDS.iter().copied())
}

fn table<M: Model>() -> String { quote(M::KIND.name()) }

impl Db<'_> {
  // ── Reads ─────────────────────────────────────────────────────────────

  fn select<M: Model>(&self, filter: &Filter) -> Result<Vec<M>> {
    let mut sql = format!(
      "SELECT {} FROM {}",
      columns::<M>().map(quote).collect::<Vec<_>>().join(", "),
      table::<M>(),
    );
    let mut params = Vec::new();
    let mut conditions = Vec::new();
    for clause in filter.clauses() {
      conditions.push(self.condition::<M>(clause, &mut params)?);
    }
    if !conditions.is_empty() {
      sql.push_str(" WHERE ");
      sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY \"id\"");

    let names: Vec<&'static str> = columns::<M>().collect();
    let mut stmt = self.conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(raw) = rows.next()? {
      let mut row = Row::new();
      for (i, name) in names.iter().enumerate() {
        row.insert(*name, decode_value(name, raw.get_ref(i)?)?);
      }
      let mut instance = M::from_row(&row)?;
      instance.hydrate(self)?;
      out.push(instance);
    }
    Ok(out)
  }

  fn condition<M: Model>(
    &self,
    clause: &Clause,
    params: &mut Vec<rusqlite::types::Value>,
  ) -> Result<String> {
    if !columns::<M>().any(|c| c == clause.column) {
      return Err(Error::UnknownColumn {
        model:  M::KIND.name(),
        column: clause.column.clone(),
      });
    }
    if clause.values.is_empty() {
      return Ok("0".to_owned());
    }
    params.extend(clause.values.iter().map(encode_value));
    let placeholders = vec!["?"; clause.values.len()].join(", ");
    Ok(format!("{} IN ({placeholders})", quote(&clause.column)))
  }

  fn fetch<M: Model>(&self, id: i64) -> Result<Option<M>> {
    let filter = Filter::all().and(Clause::equals("id", id));
    Ok(self.select::<M>(&filter)?.into_iter().next())
  }

  fn fetch_json<M: Model>(&self, id: i64) -> Result<Option<serde_json::Value>> {
    match self.fetch::<M>(id)? {
      Some(instance) => Ok(Some(serde_json::to_value(instance)?)),
      None => Ok(None),
    }
  }

  fn fetch_relation<M: Model>(
    &self,
    id: i64,
    field: &str,
  ) -> Result<Option<Relation>> {
    let Some(instance) = self.fetch::<M>(id)? else {
      return Ok(None);
    };
    let relation = instance.relation(field).ok_or_else(|| {
      frami_core::Error::BadPath { model: M::KIND.name(), path: field.to_owned() }
    })?;
    Ok(Some(relation))
  }

  fn resolve(&self, target: Target) -> Result<Option<serde_json::Value>> {
    match target {
      Target::Appointment(id) => self.fetch_json::<Appointment>(id),
      Target::AppointmentRequest(id) => self.fetch_json::<AppointmentRequest>(id),
      Target::Prescription(id) => self.fetch_json::<Prescription>(id),
      Target::PrescriptionRequest(id) => {
        self.fetch_json::<PrescriptionRequest>(id)
      }
      Target::Question(id) => self.fetch_json::<Question>(id),
      Target::Answer(id) => self.fetch_json::<Answer>(id),
      Target::Result(id) => self.fetch_json::<LabResult>(id),
    }
  }

  fn user_id(&self, username: &str) -> Result<Option<UserId>> {
    Ok(
      self
        .conn
        .query_row(
          "SELECT id FROM \"user\" WHERE username = ?1",
          [username],
          |r| r.get(0),
        )
        .optional()?,
    )
  }

  fn user_in_group(&self, user: UserId, group: &str) -> Result<bool> {
    let staff_admin = group == ADMIN_GROUP
      && self
        .conn
        .query_row(
          "SELECT is_staff FROM \"user\" WHERE id = ?1",
          [user],
          |r| r.get::<_, bool>(0),
        )
        .optional()?
        .unwrap_or(false);
    Ok(staff_admin || self.groups_of(user)?.iter().any(|g| g == group))
  }

  fn exists(&self, table: &str, id: i64) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1", quote(table));
    Ok(self.conn.query_row(&sql, [id], |_| Ok(())).optional()?.is_some())
  }

  fn permissions(&self, groups: &BTreeSet<String>) -> Result<BTreeSet<Permission>> {
    let mut stmt = self
      .conn
      .prepare("SELECT codename FROM group_permissions WHERE group_name = ?1")?;
    let mut perms = BTreeSet::new();
    for group in groups {
      let codenames = stmt
        .query_map([group], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      for codename in codenames {
        perms.insert(codename.parse::<Permission>()?);
      }
    }
    Ok(perms)
  }

  // ── Validation ────────────────────────────────────────────────────────

  /// Every reference of `instance` must resolve, except those also held by
  /// `stored`. Unchanged references were valid when written and may since
  /// point at the sentinel.
  fn check_references<M: Model>(
    &self,
    instance: &M,
    stored: Option<&M>,
  ) -> Result<()> {
    let kept = stored.map(Model::references).unwrap_or_default();
    let mut errors = ValidationErrors::new();
    for reference in instance.references() {
      if kept.contains(&reference) {
        continue;
      }
      let (ok, id) = match reference.to {
        Referent::User { id, group: None } => (self.exists("user", id)?, id),
        Referent::User { id, group: Some(group) } => {
          (self.exists("user", id)? && self.user_in_group(id, group)?, id)
        }
        Referent::Entity(target) => {
          (self.exists(target.kind().name(), target.id())?, target.id())
        }
      };
      if !ok {
        errors.add(
          reference.field,
          "does_not_exist",
          format!("Invalid pk \"{id}\" - object does not exist."),
        );
      }
    }
    Ok(errors.finish(())?)
  }

  fn check_user(&self, user: &User) -> Result<()> {
    let mut errors = ValidationErrors::new();
    let taken = self.user_id(&user.username)?;
    if user.username == SENTINEL_USERNAME {
      if taken != Some(user.id) {
        errors.add("username", "reserved", "This username is reserved.");
      }
    } else if taken.is_some_and(|existing| existing != user.id) {
      errors.add(
        "username",
        "unique",
        "A user with that username already exists.",
      );
    }
    for group in &user.groups {
      if !self.group_exists(group)? {
        errors.add(
          "groups",
          "does_not_exist",
          format!("Object with name={group} does not exist."),
        );
      }
    }
    Ok(errors.finish(())?)
  }

  // ── Writes ────────────────────────────────────────────────────────────

  fn insert_row<M: Model>(&self, instance: &M) -> Result<i64> {
    let values = M::FIELDS
      .iter()
      .map(|f| instance.value(f).as_ref().map(encode_value))
      .collect::<Option<Vec<_>>>()
      .ok_or_else(|| Error::UnknownColumn {
        model:  M::KIND.name(),
        column: M::FIELDS.join(","),
      })?;
    let sql = format!(
      "INSERT INTO {} ({}) VALUES ({})",
      table::<M>(),
      M::FIELDS.iter().map(|f| quote(f)).collect::<Vec<_>>().join(", "),
      vec!["?"; M::FIELDS.len()].join(", "),
    );
    self.conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(self.conn.last_insert_rowid())
  }

  fn update_row<M: Model>(&self, instance: &M) -> Result<()> {
    let mut values = Vec::with_capacity(M::FIELDS.len() + 1);
    for field in M::FIELDS {
      let value = instance.value(field).ok_or_else(|| Error::UnknownColumn {
        model:  M::KIND.name(),
        column: (*field).to_owned(),
      })?;
      values.push(encode_value(&value));
    }
    values.push(rusqlite::types::Value::Integer(instance.id()));
    let sql = format!(
      "UPDATE {} SET {} WHERE \"id\" = ?",
      table::<M>(),
      M::FIELDS
        .iter()
        .map(|f| format!("{} = ?", quote(f)))
        .collect::<Vec<_>>()
        .join(", "),
    );
    let changed = self.conn.execute(&sql, params_from_iter(values.iter()))?;
    if changed == 0 {
      return Err(Error::NotFound { model: M::KIND.name(), id: instance.id() });
    }
    Ok(())
  }

  fn delete_row<M: Model>(&self, id: i64) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE \"id\" = ?1", table::<M>());
    if self.conn.execute(&sql, [id])? == 0 {
      return Err(Error::NotFound { model: M::KIND.name(), id });
    }
    Ok(())
  }

  fn set_groups(&self, user: UserId, groups: &[String]) -> Result<()> {
    self
      .conn
      .execute("DELETE FROM user_groups WHERE user_id = ?1", [user])?;
    let mut stmt = self.conn.prepare(
      "INSERT OR IGNORE INTO user_groups (user_id, group_name) VALUES (?1, ?2)",
    )?;
    for group in groups {
      stmt.execute(rusqlite::params![user, group])?;
    }
    Ok(())
  }

  /// Plan and insert the notifications for `signal`.
  fn fire<M: Model>(
    &self,
    instance: &M,
    signal: Signal,
    created: bool,
  ) -> Result<()> {
    let Some(dispatch) =
      self.fanout.plan(instance, signal, created, self, self.now)?
    else {
      return Ok(());
    };
    for notification in &dispatch.users {
      self.insert_row(notification)?;
    }
    for notification in &dispatch.groups {
      self.insert_row(notification)?;
    }
    Ok(())
  }

  fn saved<M: Model>(&self, id: i64) -> Result<M> {
    self
      .fetch(id)?
      .ok_or(Error::NotFound { model: M::KIND.name(), id })
  }

  fn insert<M: Model>(&self, instance: &M) -> Result<M> {
    self.check_references(instance, None)?;
    self.fire(instance, Signal::PreSave, true)?;
    let id = self.insert_row(instance)?;
    let saved = self.saved::<M>(id)?;
    self.fire(&saved, Signal::PostSave, true)?;
    debug!(model = %M::KIND, id, "inserted");
    Ok(saved)
  }

  fn save<M: Model>(&self, instance: &M) -> Result<M> {
    let stored = self.saved::<M>(instance.id())?;
    self.check_references(instance, Some(&stored))?;
    self.fire(instance, Signal::PreSave, false)?;
    self.update_row(instance)?;
    let saved = self.saved::<M>(instance.id())?;
    self.fire(&saved, Signal::PostSave, false)?;
    debug!(model = %M::KIND, id = instance.id(), "saved");
    Ok(saved)
  }

  fn delete<M: Model>(&self, instance: &M) -> Result<()> {
    self.fire(instance, Signal::PreDelete, false)?;
    self.delete_row::<M>(instance.id())?;
    self.fire(instance, Signal::PostDelete, false)?;
    debug!(model = %M::KIND, id = instance.id(), "deleted");
    Ok(())
  }

  /// Get or create the placeholder user.
  fn sentinel(&self) -> Result<UserId> {
    if let Some(id) = self.user_id(SENTINEL_USERNAME)? {
      return Ok(id);
    }
    let mut user = User::new(SENTINEL_USERNAME, self.now);
    // Not a valid PHC string, so no password ever verifies.
    user.password = "!".to_owned();
    let id = self.insert_row(&user)?;
    info!(id, "created sentinel user");
    Ok(id)
  }
}

impl Lookup for Db<'_> {
  type Error = Error;

  fn related(&self, target: Target, field: &str) -> Result<Option<Relation>> {
    match target {
      Target::Appointment(id) => self.fetch_relation::<Appointment>(id, field),
      Target::AppointmentRequest(id) => {
        self.fetch_relation::<AppointmentRequest>(id, field)
      }
      Target::Prescription(id) => self.fetch_relation::<Prescription>(id, field),
      Target::PrescriptionRequest(id) => {
        self.fetch_relation::<PrescriptionRequest>(id, field)
      }
      Target::Question(id) => self.fetch_relation::<Question>(id, field),
      Target::Answer(id) => self.fetch_relation::<Answer>(id, field),
      Target::Result(id) => self.fetch_relation::<LabResult>(id, field),
    }
  }

  fn children<C: Model>(&self, field: &str, parent: i64) -> Result<Vec<C>> {
    self.select(&Filter::all().and(Clause::equals(field, parent)))
  }

  fn groups_of(&self, user: UserId) -> Result<Vec<String>> {
    let mut stmt = self.conn.prepare(
      "SELECT group_name FROM user_groups WHERE user_id = ?1 ORDER BY group_name",
    )?;
    let groups = stmt
      .query_map([user], |r| r.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(groups)
  }

  fn group_exists(&self, name: &str) -> Result<bool> {
    Ok(
      self
        .conn
        .query_row("SELECT 1 FROM groups WHERE name = ?1", [name], |_| Ok(()))
        .optional()?
        .is_some(),
    )
  }
}

// ─── PortalStore impl ────────────────────────────────────────────────────────

impl PortalStore for SqliteStore {
  type Error = Error;

  async fn list<M: Model>(&self, filter: Filter) -> Result<Vec<M>> {
    self.read(move |db| db.select(&filter)).await
  }

  async fn get<M: Model>(&self, id: i64, filter: Filter) -> Result<Option<M>> {
    let filter = filter.and(Clause::equals("id", id));
    self
      .read(move |db| Ok(db.select(&filter)?.into_iter().next()))
      .await
  }

  async fn insert<M: Model>(&self, instance: M) -> Result<M> {
    self.transact(move |db| db.insert(&instance)).await
  }

  async fn save<M: Model>(&self, instance: M) -> Result<M> {
    self.transact(move |db| db.save(&instance)).await
  }

  async fn delete<M: Model>(&self, instance: M) -> Result<()> {
    self.transact(move |db| db.delete(&instance)).await
  }

  async fn resolve(&self, target: Target) -> Result<Option<serde_json::Value>> {
    self.read(move |db| db.resolve(target)).await
  }

  async fn create_user(&self, user: User) -> Result<User> {
    self
      .transact(move |db| {
        db.check_user(&user)?;
        db.fire(&user, Signal::PreSave, true)?;
        let id = db.insert_row(&user)?;
        db.set_groups(id, &user.groups)?;
        let saved = db.saved::<User>(id)?;
        db.fire(&saved, Signal::PostSave, true)?;
        info!(id, username = %saved.username, "created user");
        Ok(saved)
      })
      .await
  }

  async fn save_user(&self, user: User) -> Result<User> {
    self
      .transact(move |db| {
        db.check_user(&user)?;
        db.fire(&user, Signal::PreSave, false)?;
        db.update_row(&user)?;
        db.set_groups(user.id, &user.groups)?;
        let saved = db.saved::<User>(user.id)?;
        db.fire(&saved, Signal::PostSave, false)?;
        debug!(id = user.id, "saved user");
        Ok(saved)
      })
      .await
  }

  async fn delete_user(&self, id: UserId) -> Result<()> {
    self
      .transact(move |db| {
        let user = db.saved::<User>(id)?;
        if user.username == SENTINEL_USERNAME {
          return Err(
            ValidationErrors::single(
              "username",
              "protected",
              "The placeholder user cannot be deleted.",
            )
            .into(),
          );
        }
        let sentinel = db.sentinel()?;
        for (table, column) in SENTINEL_REFERENCES {
          let sql = format!(
            "UPDATE {} SET {col} = ?1 WHERE {col} = ?2",
            quote(table),
            col = quote(column),
          );
          let moved = db.conn.execute(&sql, [sentinel, id])?;
          if moved > 0 {
            debug!(table, column, moved, "reassigned to sentinel");
          }
        }
        db.delete(&user)?;
        info!(id, username = %user.username, "deleted user");
        Ok(())
      })
      .await
  }

  async fn credentials(&self, username: String) -> Result<Option<Credentials>> {
    self
      .read(move |db| {
        let filter = Filter::all().and(Clause::equals("username", username));
        let Some(user) = db.select::<User>(&filter)?.into_iter().next() else {
          return Ok(None);
        };
        let mut groups: BTreeSet<String> = user.groups.iter().cloned().collect();
        if user.is_staff {
          groups.insert(ADMIN_GROUP.to_owned());
        }
        let permissions = db.permissions(&groups)?;
        Ok(Some(Credentials {
          principal:     Principal {
            id: user.id,
            username: user.username,
            groups,
            permissions,
          },
          password_hash: user.password,
        }))
      })
      .await
  }

  async fn provision_groups(&self, table: GroupTable) -> Result<()> {
    self
      .transact(move |db| {
        for (name, perms) in table.iter() {
          db.conn
            .execute("INSERT OR IGNORE INTO groups (name) VALUES (?1)", [name])?;
          db.conn
            .execute("DELETE FROM group_permissions WHERE group_name = ?1", [name])?;
          for perm in perms {
            db.conn.execute(
              "INSERT INTO group_permissions (group_name, codename) VALUES (?1, ?2)",
              rusqlite::params![name, perm.codename()],
            )?;
          }
          info!(group = name, permissions = perms.len(), "provisioned group");
        }
        Ok(())
      })
      .await
  }
}
