//! SQL schema for the Frami SQLite store.
//!
//! Table and column names match [`ModelKind::name`] and each model's
//! `FIELDS`, which is what the generic row mapping in `store.rs` relies on.
//!
//! [`ModelKind::name`]: frami_core::model::ModelKind::name

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// References to a patient, requester or parent row cascade. Author
/// references (`creator` on clinical records, `staff` on appointments) have
/// no delete action: the store moves them to the sentinel user before the
/// referenced user is deleted.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS \"user\" (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT    NOT NULL UNIQUE,
    email       TEXT    NOT NULL DEFAULT '',
    first_name  TEXT    NOT NULL DEFAULT '',
    last_name   TEXT    NOT NULL DEFAULT '',
    is_staff    INTEGER NOT NULL DEFAULT 0,
    password    TEXT    NOT NULL,           -- argon2 PHC string
    date_joined TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS groups (
    name TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS group_permissions (
    group_name TEXT NOT NULL REFERENCES groups(name) ON DELETE CASCADE,
    codename   TEXT NOT NULL,               -- '<verb>_<model>'
    PRIMARY KEY (group_name, codename)
);

CREATE TABLE IF NOT EXISTS user_groups (
    user_id    INTEGER NOT NULL REFERENCES \"user\"(id) ON DELETE CASCADE,
    group_name TEXT    NOT NULL REFERENCES groups(name) ON DELETE CASCADE,
    PRIMARY KEY (user_id, group_name)
);

CREATE TABLE IF NOT EXISTS appointment (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    start_date        TEXT    NOT NULL,
    end_date          TEXT    NOT NULL,
    note              TEXT    NOT NULL DEFAULT '',
    patient           INTEGER NOT NULL REFERENCES \"user\"(id) ON DELETE CASCADE,
    staff             INTEGER NOT NULL REFERENCES \"user\"(id),
    creator           INTEGER NOT NULL REFERENCES \"user\"(id),
    creation_date     TEXT    NOT NULL,
    modification_date TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS appointmentrequest (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    start_date        TEXT    NOT NULL,
    end_date          TEXT    NOT NULL,
    subject           TEXT    NOT NULL DEFAULT '',
    message           TEXT    NOT NULL DEFAULT '',
    staff             INTEGER REFERENCES \"user\"(id) ON DELETE SET NULL,
    creator           INTEGER NOT NULL REFERENCES \"user\"(id) ON DELETE CASCADE,
    creation_date     TEXT    NOT NULL,
    modification_date TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS prescription (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    medication        TEXT    NOT NULL,
    quantity          TEXT    NOT NULL,
    note              TEXT    NOT NULL DEFAULT '',
    patient           INTEGER NOT NULL REFERENCES \"user\"(id) ON DELETE CASCADE,
    creator           INTEGER NOT NULL REFERENCES \"user\"(id),
    creation_date     TEXT    NOT NULL,
    modification_date TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS prescriptionrequest (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    prescription      INTEGER NOT NULL REFERENCES prescription(id) ON DELETE CASCADE,
    creator           INTEGER NOT NULL REFERENCES \"user\"(id) ON DELETE CASCADE,
    creation_date     TEXT    NOT NULL,
    modification_date TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS question (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    subject           TEXT    NOT NULL,
    message           TEXT    NOT NULL,
    creator           INTEGER NOT NULL REFERENCES \"user\"(id) ON DELETE CASCADE,
    creation_date     TEXT    NOT NULL,
    modification_date TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS answer (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    message           TEXT    NOT NULL,
    unread            INTEGER NOT NULL DEFAULT 1,
    question          INTEGER NOT NULL REFERENCES question(id) ON DELETE CASCADE,
    creator           INTEGER NOT NULL REFERENCES \"user\"(id),
    creation_date     TEXT    NOT NULL,
    modification_date TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS result (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    kind              TEXT    NOT NULL,
    result            TEXT    NOT NULL,
    unread            INTEGER NOT NULL DEFAULT 1,
    patient           INTEGER NOT NULL REFERENCES \"user\"(id) ON DELETE CASCADE,
    creator           INTEGER NOT NULL REFERENCES \"user\"(id),
    creation_date     TEXT    NOT NULL,
    modification_date TEXT    NOT NULL
);

-- Notification targets are polymorphic and deliberately unconstrained:
-- a notification outlives the entity it reports on.
CREATE TABLE IF NOT EXISTS usernotification (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid          TEXT    NOT NULL,         -- correlation id
    target_type   TEXT    NOT NULL,
    target_id     INTEGER NOT NULL,
    target_name   TEXT    NOT NULL,
    event         TEXT    NOT NULL,         -- 'created' | 'changed' | 'deleted'
    read          INTEGER NOT NULL DEFAULT 0,
    creation_date TEXT    NOT NULL,
    \"user\"      INTEGER NOT NULL REFERENCES \"user\"(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS groupnotification (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid          TEXT    NOT NULL,
    target_type   TEXT    NOT NULL,
    target_id     INTEGER NOT NULL,
    target_name   TEXT    NOT NULL,
    event         TEXT    NOT NULL,
    read          INTEGER NOT NULL DEFAULT 0,
    creation_date TEXT    NOT NULL,
    \"group\"     TEXT    NOT NULL REFERENCES groups(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS usernotification_uuid_idx  ON usernotification(uuid);
CREATE INDEX IF NOT EXISTS groupnotification_uuid_idx ON groupnotification(uuid);

PRAGMA user_version = 1;
";

/// References moved to the sentinel user when the referenced user is
/// deleted, as `(table, column)`.
pub const SENTINEL_REFERENCES: &[(&str, &str)] = &[
  ("appointment", "staff"),
  ("appointment", "creator"),
  ("prescription", "creator"),
  ("answer", "creator"),
  ("result", "creator"),
];
