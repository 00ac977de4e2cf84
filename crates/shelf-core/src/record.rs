//! Field values and the record types built from them.

use std::collections::{BTreeMap, btree_map};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Value ───────────────────────────────────────────────────────────────────

/// A single field value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
  #[default]
  Null,
  Boolean(bool),
  Integer(i64),
  Real(f64),
  Text(String),
  Timestamp(DateTime<Utc>),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Real(r) => Some(*r),
      Self::Integer(i) => Some(*i as f64),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Self::Boolean(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
    match self {
      Self::Timestamp(t) => Some(*t),
      _ => None,
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self { Self::Boolean(b) }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self { Self::Integer(i) }
}

impl From<i32> for Value {
  fn from(i: i32) -> Self { Self::Integer(i.into()) }
}

impl From<f64> for Value {
  fn from(r: f64) -> Self { Self::Real(r) }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<DateTime<Utc>> for Value {
  fn from(t: DateTime<Utc>) -> Self { Self::Timestamp(t) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
  pub fn new() -> Self { Self::default() }

  /// Builder-style [`Record::set`].
  pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
    self.set(field, value);
    self
  }

  /// Assign a field, returning the previous value if there was one.
  pub fn set(
    &mut self,
    field: impl Into<String>,
    value: impl Into<Value>,
  ) -> Option<Value> {
    self.0.insert(field.into(), value.into())
  }

  /// The value of `field`; absent fields read as `Null`.
  pub fn get(&self, field: &str) -> &Value {
    const NULL: &Value = &Value::Null;
    self.0.get(field).unwrap_or(NULL)
  }

  pub fn contains(&self, field: &str) -> bool { self.0.contains_key(field) }

  pub fn remove(&mut self, field: &str) -> Option<Value> { self.0.remove(field) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn fields(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

  pub fn iter(&self) -> btree_map::Iter<'_, String, Value> { self.0.iter() }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

impl IntoIterator for Record {
  type Item = (String, Value);
  type IntoIter = btree_map::IntoIter<String, Value>;

  fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl<'a> IntoIterator for &'a Record {
  type Item = (&'a String, &'a Value);
  type IntoIter = btree_map::Iter<'a, String, Value>;

  fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

// ─── Staging record ──────────────────────────────────────────────────────────

/// One row of a staging table.
///
/// `values` holds every derived field; fields the caller never supplied read
/// as `Null`. Assignments through [`StagingRecord::set`] stay in memory until
/// the record is saved or shelved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
  /// Store-assigned; never reused.
  pub staging_id: i64,
  pub expires_at: Option<DateTime<Utc>>,
  pub values:     Record,
}

impl StagingRecord {
  pub fn get(&self, field: &str) -> &Value { self.values.get(field) }

  pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
    self.values.set(field, value);
  }
}

// ─── Wrapped record ──────────────────────────────────────────────────────────

/// A permanent-schema value built from a staging record, not yet persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WrappedRecord {
  /// Local target fields, minus the auto identity.
  pub values:    Record,
  /// Referenced rows keyed by foreign-key field name. Empty unless relations
  /// were populated.
  pub relations: BTreeMap<String, Record>,
}
