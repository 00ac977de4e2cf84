//! Target schema descriptors: the read-only description of a permanent
//! entity that staging schemas are derived from.
//!
//! A [`TargetSchema`] lists only its *local* fields. Fields declared on
//! ancestors of a multi-table inheritance chain live on the parent schemas,
//! which are referenced through [`TargetSchema::parents`].

use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, record::Value};

// ─── Field types ─────────────────────────────────────────────────────────────

/// Semantic type of a field; doubles as the storage affinity.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FieldType {
  Integer,
  Real,
  Text,
  Boolean,
  Timestamp,
}

impl FieldType {
  /// Whether `value` can be stored in a field of this type. `Null` is always
  /// accepted here; nullability is a separate concern.
  pub fn accepts(self, value: &Value) -> bool {
    matches!(
      (self, value),
      (_, Value::Null)
        | (Self::Integer, Value::Integer(_))
        | (Self::Real, Value::Real(_) | Value::Integer(_))
        | (Self::Text, Value::Text(_))
        | (Self::Boolean, Value::Boolean(_))
        | (Self::Timestamp, Value::Timestamp(_))
    )
  }

  /// The value as stored in a field of this type: integers assigned to a
  /// real field are widened.
  pub fn coerce(self, value: Value) -> Value {
    match (self, value) {
      (Self::Real, Value::Integer(i)) => Value::Real(i as f64),
      (_, value) => value,
    }
  }
}

// ─── Relations ───────────────────────────────────────────────────────────────

/// What happens to referencing rows when the referenced row is deleted.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
  #[default]
  Cascade,
  Restrict,
  SetNull,
  NoAction,
}

/// The table a foreign key points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "table", rename_all = "snake_case")]
pub enum FkTarget {
  /// The schema that declares the field.
  SelfRef,
  Table(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
  pub target:       FkTarget,
  pub remote_field: String,
  pub on_delete:    OnDelete,
  /// Name under which the referenced schema exposes the reverse relation.
  pub related_name: Option<String>,
  pub one_to_one:   bool,
  /// Marks the link from a child table to its parent in multi-table
  /// inheritance.
  pub parent_link:  bool,
  pub serialize:    bool,
}

impl ForeignKey {
  pub fn to_table(table: impl Into<String>, remote_field: impl Into<String>) -> Self {
    Self {
      target:       FkTarget::Table(table.into()),
      remote_field: remote_field.into(),
      on_delete:    OnDelete::default(),
      related_name: None,
      one_to_one:   false,
      parent_link:  false,
      serialize:    true,
    }
  }

  pub fn to_self(remote_field: impl Into<String>) -> Self {
    Self { target: FkTarget::SelfRef, ..Self::to_table("", remote_field) }
  }

  /// A one-to-one parent link, as used by a child table in multi-table
  /// inheritance.
  pub fn parent_link(
    table: impl Into<String>,
    remote_field: impl Into<String>,
  ) -> Self {
    Self {
      one_to_one: true,
      parent_link: true,
      serialize: false,
      ..Self::to_table(table, remote_field)
    }
  }

  pub fn on_delete(mut self, on_delete: OnDelete) -> Self {
    self.on_delete = on_delete;
    self
  }

  pub fn related_name(mut self, name: impl Into<String>) -> Self {
    self.related_name = Some(name.into());
    self
  }

  pub fn one_to_one(mut self) -> Self {
    self.one_to_one = true;
    self
  }

  /// Resolve the referenced table name; `owner` is the table that declares
  /// the field.
  pub fn referenced_table<'a>(&'a self, owner: &'a str) -> &'a str {
    match &self.target {
      FkTarget::SelfRef => owner,
      FkTarget::Table(table) => table,
    }
  }
}

// ─── Field descriptor ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
  pub name:          String,
  pub ty:            FieldType,
  pub nullable:      bool,
  pub primary_key:   bool,
  /// Store-assigned identity; never supplied by callers.
  pub auto_identity: bool,
  pub unique:        bool,
  /// Non-unique index on the column.
  pub indexed:       bool,
  /// Applied when a new record omits the field.
  pub default:       Option<Value>,
  pub foreign_key:   Option<ForeignKey>,
  pub many_to_many:  bool,
}

impl FieldDescriptor {
  /// A non-null, unconstrained field.
  pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
    Self {
      name: name.into(),
      ty,
      nullable: false,
      primary_key: false,
      auto_identity: false,
      unique: false,
      indexed: false,
      default: None,
      foreign_key: None,
      many_to_many: false,
    }
  }

  /// An auto-incrementing integer primary key.
  pub fn auto_id(name: impl Into<String>) -> Self {
    Self {
      primary_key: true,
      auto_identity: true,
      ..Self::new(name, FieldType::Integer)
    }
  }

  pub fn many_to_many(name: impl Into<String>, table: impl Into<String>) -> Self {
    Self {
      many_to_many: true,
      foreign_key: Some(ForeignKey::to_table(table, "id")),
      ..Self::new(name, FieldType::Integer)
    }
  }

  pub fn optional(mut self) -> Self {
    self.nullable = true;
    self
  }

  pub fn as_primary_key(mut self) -> Self {
    self.primary_key = true;
    self
  }

  pub fn as_unique(mut self) -> Self {
    self.unique = true;
    self
  }

  pub fn with_index(mut self) -> Self {
    self.indexed = true;
    self
  }

  pub fn with_default(mut self, value: impl Into<Value>) -> Self {
    self.default = Some(value.into());
    self
  }

  pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
    self.foreign_key = Some(fk);
    self
  }

  pub fn is_relation(&self) -> bool { self.foreign_key.is_some() }
}

// ─── Target schema ───────────────────────────────────────────────────────────

/// The permanent entity a staging schema is derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSchema {
  name:    String,
  table:   String,
  fields:  Vec<FieldDescriptor>,
  /// Index of the primary key in `fields`.
  pk:      usize,
  parents: Vec<Arc<TargetSchema>>,
}

impl TargetSchema {
  /// Build a schema from its local fields.
  ///
  /// Fails with [`Error::InvalidSchema`] unless exactly one field is the
  /// primary key, field names are distinct, and every auto identity is an
  /// integer primary key.
  pub fn new(
    name: impl Into<String>,
    table: impl Into<String>,
    fields: Vec<FieldDescriptor>,
  ) -> Result<Self> {
    let name = name.into();
    let table = table.into();
    let invalid = |reason: String| Error::InvalidSchema {
      schema: name.clone(),
      reason,
    };

    if table.is_empty() {
      return Err(invalid("table name is empty".into()));
    }

    let mut seen = HashSet::new();
    for field in &fields {
      if !seen.insert(field.name.as_str()) {
        return Err(invalid(format!("duplicate field {:?}", field.name)));
      }
      if field.auto_identity
        && (!field.primary_key || field.ty != FieldType::Integer)
      {
        return Err(invalid(format!(
          "auto identity {:?} must be an integer primary key",
          field.name
        )));
      }
    }

    let mut keys = fields.iter().enumerate().filter(|(_, f)| f.primary_key);
    let pk = match (keys.next(), keys.count()) {
      (Some((i, _)), 0) => i,
      (Some(_), rest) => return Err(invalid(format!("{} primary keys", rest + 1))),
      (None, _) => return Err(invalid("no primary key".into())),
    };

    Ok(Self { name, table, fields, pk, parents: Vec::new() })
  }

  /// Declare `parent` as the next ancestor in a multi-table inheritance
  /// chain. A local parent-link foreign key to the parent's table must
  /// already be among the fields.
  pub fn inherits(mut self, parent: Arc<TargetSchema>) -> Result<Self> {
    if self.parent_link_for(&parent).is_none() {
      return Err(Error::InvalidSchema {
        schema: self.name,
        reason: format!("no parent link to {}", parent.table),
      });
    }
    self.parents.push(parent);
    Ok(self)
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn table(&self) -> &str { &self.table }

  /// Local fields, in declaration order.
  pub fn fields(&self) -> &[FieldDescriptor] { &self.fields }

  pub fn parents(&self) -> &[Arc<TargetSchema>] { &self.parents }

  pub fn has_parents(&self) -> bool { !self.parents.is_empty() }

  pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
    self.fields.iter().find(|f| f.name == name)
  }

  pub fn primary_key_field(&self) -> &FieldDescriptor { &self.fields[self.pk] }

  /// The local field linking this schema to `parent`'s table.
  pub fn parent_link_for(&self, parent: &TargetSchema) -> Option<&FieldDescriptor> {
    self.fields.iter().find(|f| {
      f.foreign_key.as_ref().is_some_and(|fk| {
        fk.parent_link && fk.referenced_table(&self.table) == parent.table
      })
    })
  }
}
