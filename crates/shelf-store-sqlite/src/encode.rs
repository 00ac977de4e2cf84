//! Encoding and decoding helpers between [`Value`]s and SQLite storage
//! classes.
//!
//! Timestamps are stored as RFC 3339 UTC strings with fixed nanosecond
//! precision, so text comparison orders them chronologically and every
//! `DateTime<Utc>` reads back unchanged. Booleans are
//! stored as `0`/`1` integers.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use shelf_core::{record::Value, schema::FieldType};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

// ─── Value ───────────────────────────────────────────────────────────────────

pub fn encode_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
    Value::Integer(i) => SqlValue::Integer(*i),
    Value::Real(r) => SqlValue::Real(*r),
    Value::Text(s) => SqlValue::Text(s.clone()),
    Value::Timestamp(t) => SqlValue::Text(encode_dt(*t)),
  }
}

/// Decode a column declared as `ty`.
pub fn decode_value(ty: FieldType, raw: SqlValue) -> Result<Value> {
  Ok(match (ty, raw) {
    (_, SqlValue::Null) => Value::Null,
    (FieldType::Integer, SqlValue::Integer(i)) => Value::Integer(i),
    (FieldType::Boolean, SqlValue::Integer(i)) => Value::Boolean(i != 0),
    (FieldType::Real, SqlValue::Integer(i)) => Value::Real(i as f64),
    (FieldType::Real, SqlValue::Real(r)) => Value::Real(r),
    (FieldType::Text, SqlValue::Text(s)) => Value::Text(s),
    (FieldType::Timestamp, SqlValue::Text(s)) => Value::Timestamp(decode_dt(&s)?),
    (ty, other) => {
      return Err(Error::Decode(format!("{other:?} in a {ty} column")));
    }
  })
}

/// Decode a column without a known declared type.
pub fn decode_dynamic(raw: SqlValue) -> Result<Value> {
  Ok(match raw {
    SqlValue::Null => Value::Null,
    SqlValue::Integer(i) => Value::Integer(i),
    SqlValue::Real(r) => Value::Real(r),
    SqlValue::Text(s) => Value::Text(s),
    SqlValue::Blob(_) => return Err(Error::Decode("unexpected blob".into())),
  })
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Quote an identifier for interpolation into SQL.
pub fn ident(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

pub fn sql_type(ty: FieldType) -> &'static str {
  match ty {
    FieldType::Integer | FieldType::Boolean => "INTEGER",
    FieldType::Real => "REAL",
    FieldType::Text | FieldType::Timestamp => "TEXT",
  }
}
