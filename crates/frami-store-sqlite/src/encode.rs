//! Conversions between core [`Value`]s and SQLite values.
//!
//! Timestamps are stored as RFC 3339 strings and booleans as `0`/`1`.

use frami_core::model::Value;
use rusqlite::types::{Value as Sql, ValueRef};

use crate::Result;

pub fn encode_value(value: &Value) -> Sql {
  match value {
    Value::Null => Sql::Null,
    Value::Int(v) => Sql::Integer(*v),
    Value::Bool(v) => Sql::Integer(i64::from(*v)),
    Value::Text(v) => Sql::Text(v.clone()),
    Value::Time(v) => Sql::Text(v.to_rfc3339()),
  }
}

pub fn decode_value(column: &str, value: ValueRef<'_>) -> Result<Value> {
  match value {
    ValueRef::Null => Ok(Value::Null),
    ValueRef::Integer(v) => Ok(Value::Int(v)),
    ValueRef::Text(bytes) => Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
    ValueRef::Real(_) | ValueRef::Blob(_) => Err(
      frami_core::Error::Column {
        column: column.to_owned(),
        reason: format!("unsupported storage class {:?}", value.data_type()),
      }
      .into(),
    ),
  }
}

/// Double-quote an identifier; column names such as `group` are keywords.
pub fn quote(ident: &str) -> String { format!("\"{ident}\"") }

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;

  #[test]
  fn booleans_and_times_use_storage_forms() {
    assert_eq!(encode_value(&Value::Bool(true)), Sql::Integer(1));
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(
      encode_value(&Value::Time(at)),
      Sql::Text("2024-01-02T03:04:05+00:00".into())
    );
  }

  #[test]
  fn real_columns_are_rejected() {
    assert!(decode_value("x", ValueRef::Real(1.5)).is_err());
    assert_eq!(decode_value("x", ValueRef::Integer(3)).unwrap(), Value::Int(3));
  }
}
