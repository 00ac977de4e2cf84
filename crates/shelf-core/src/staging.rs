//! Derivation of a permissive staging schema from a target schema.
//!
//! The staging schema carries every local target field that a caller could
//! ever supply, relaxed so that any subset of values forms a legal row:
//!
//! - auto identities are dropped, since no value is ever staged for them;
//! - the target primary key is demoted to an ordinary field;
//! - every other field becomes nullable;
//! - foreign keys are rebuilt without reverse relations or parent-link
//!   semantics, and self references point at the *target* table;
//! - uniqueness is replaced by a plain index.
//!
//! Fields inherited from ancestors of a multi-table inheritance chain are not
//! copied; a staged child row references its parent through the parent-link
//! field like any other foreign key.

use std::{fmt, sync::Arc};

use chrono::TimeDelta;

use crate::{
  Error, Result,
  expiry::ExpiryPolicy,
  record::{Record, Value},
  schema::{FieldDescriptor, FieldType, FkTarget, ForeignKey, TargetSchema},
};

/// Synthetic auto-incrementing primary key of every staging table.
pub const STAGING_ID_FIELD: &str = "staging_id";

/// Synthetic expiry timestamp, present when the schema has a lifetime.
pub const STAGING_EXPIRY_FIELD: &str = "staging_expiry";

// ─── Options ─────────────────────────────────────────────────────────────────

/// How the staging table is named.
#[derive(Clone)]
pub enum TableNaming {
  /// Target table name followed by the suffix.
  Suffix(String),
  Custom(Arc<dyn Fn(&TargetSchema) -> String + Send + Sync>),
}

impl TableNaming {
  pub fn table_for(&self, target: &TargetSchema) -> String {
    match self {
      Self::Suffix(suffix) => format!("{}{suffix}", target.table()),
      Self::Custom(f) => f(target),
    }
  }
}

impl Default for TableNaming {
  fn default() -> Self { Self::Suffix("_staging".into()) }
}

impl fmt::Debug for TableNaming {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Suffix(suffix) => f.debug_tuple("Suffix").field(suffix).finish(),
      Self::Custom(_) => f.write_str("Custom(..)"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct DeriveOptions {
  /// Lifetime of a staging record; `None` disables expiry.
  pub lifetime:     Option<TimeDelta>,
  pub table_naming: TableNaming,
  /// Appended to the target schema name to name the staging schema.
  pub name_suffix:  String,
}

impl Default for DeriveOptions {
  fn default() -> Self {
    Self {
      lifetime:     None,
      table_naming: TableNaming::default(),
      name_suffix:  "Staging".into(),
    }
  }
}

impl DeriveOptions {
  pub fn with_lifetime(mut self, lifetime: TimeDelta) -> Self {
    self.lifetime = Some(lifetime);
    self
  }

  pub fn with_table_naming(mut self, naming: TableNaming) -> Self {
    self.table_naming = naming;
    self
  }
}

// ─── Staging schema ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
  pub field:      String,
  pub descending: bool,
}

/// Schema of a staging table, derived once per target schema.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingSchema {
  name:           String,
  source:         Arc<TargetSchema>,
  table:          String,
  fields:         Vec<FieldDescriptor>,
  identity_field: FieldDescriptor,
  expiry:         Option<ExpiryPolicy>,
  expiry_field:   Option<FieldDescriptor>,
  ordering:       Ordering,
  latest_by:      String,
}

impl StagingSchema {
  pub fn name(&self) -> &str { &self.name }

  /// The target schema this one was derived from.
  pub fn source(&self) -> &Arc<TargetSchema> { &self.source }

  pub fn table(&self) -> &str { &self.table }

  /// Fields carried over from the target, in target declaration order.
  pub fn fields(&self) -> &[FieldDescriptor] { &self.fields }

  pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
    self.fields.iter().find(|f| f.name == name)
  }

  pub fn identity_field(&self) -> &FieldDescriptor { &self.identity_field }

  pub fn expiry(&self) -> Option<&ExpiryPolicy> { self.expiry.as_ref() }

  pub fn expiry_enabled(&self) -> bool { self.expiry.is_some() }

  pub fn expiry_field(&self) -> Option<&FieldDescriptor> { self.expiry_field.as_ref() }

  pub fn ordering(&self) -> &Ordering { &self.ordering }

  pub fn latest_by(&self) -> &str { &self.latest_by }

  /// The carried-over target primary key, or `None` when the target uses an
  /// auto identity (which is never staged).
  pub fn target_pk_field(&self) -> Option<&FieldDescriptor> {
    let pk = self.source.primary_key_field();
    if pk.auto_identity {
      return None;
    }
    self.field(&pk.name)
  }

  /// Every column of the staging table: identity, carried fields, expiry.
  pub fn columns(&self) -> impl Iterator<Item = &FieldDescriptor> {
    std::iter::once(&self.identity_field)
      .chain(self.fields.iter())
      .chain(self.expiry_field.iter())
  }

  /// Check that every assigned field exists and holds a value of its type.
  pub fn check_values(&self, values: &Record) -> Result<()> {
    for (name, value) in values {
      let field = self.field(name).ok_or_else(|| Error::UnknownField {
        schema: self.name.clone(),
        field:  name.clone(),
      })?;
      if !field.ty.accepts(value) {
        return Err(Error::TypeMismatch {
          field:    name.clone(),
          expected: field.ty,
        });
      }
    }
    Ok(())
  }

  /// Check `values` and convert them to their stored form, so that what a
  /// store hands back equals what a later read returns.
  pub fn normalize(&self, values: Record) -> Result<Record> {
    self.check_values(&values)?;
    Ok(
      values
        .into_iter()
        .map(|(name, value)| {
          let value = match self.field(&name) {
            Some(field) => field.ty.coerce(value),
            None => value,
          };
          (name, value)
        })
        .collect(),
    )
  }

  /// Complete a set of supplied values for a new record: omitted fields take
  /// their declared default, or `Null`.
  pub fn initial_values(&self, supplied: Record) -> Result<Record> {
    let mut values = self.normalize(supplied)?;
    for field in &self.fields {
      if !values.contains(&field.name) {
        let value = field.default.clone().unwrap_or(Value::Null);
        values.set(field.name.clone(), value);
      }
    }
    Ok(values)
  }

  /// Project a permanent-schema value onto the staged fields, for staging
  /// changes to an existing record. Auto identities, ancestor fields and
  /// anything else the staging schema does not carry are dropped.
  pub fn stage_values(&self, permanent: &Record) -> Record {
    self
      .fields
      .iter()
      .filter(|f| permanent.contains(&f.name))
      .map(|f| (f.name.clone(), permanent.get(&f.name).clone()))
      .collect()
  }
}

// ─── Derivation ──────────────────────────────────────────────────────────────

/// Derive the staging schema for `target`.
///
/// Fails with [`Error::UnsupportedFieldKind`] if any local field is
/// many-to-many, and with [`Error::ReservedFieldName`] if a field would clash
/// with a synthetic staging column.
pub fn derive(
  target: &Arc<TargetSchema>,
  options: &DeriveOptions,
) -> Result<StagingSchema> {
  let expiry = options.lifetime.map(ExpiryPolicy::new);

  let mut fields = Vec::with_capacity(target.fields().len());
  for field in target.fields() {
    if let Some(staged) = copy_field(target, field, expiry.is_some())? {
      fields.push(staged);
    }
  }

  let identity_field = FieldDescriptor::auto_id(STAGING_ID_FIELD);
  let expiry_field = expiry.map(|_| {
    FieldDescriptor::new(STAGING_EXPIRY_FIELD, FieldType::Timestamp).with_index()
  });

  Ok(StagingSchema {
    name: format!("{}{}", target.name(), options.name_suffix),
    source: Arc::clone(target),
    table: options.table_naming.table_for(target),
    fields,
    identity_field,
    expiry,
    expiry_field,
    ordering: Ordering { field: STAGING_ID_FIELD.into(), descending: true },
    latest_by: STAGING_ID_FIELD.into(),
  })
}

fn copy_field(
  target: &TargetSchema,
  field: &FieldDescriptor,
  expires: bool,
) -> Result<Option<FieldDescriptor>> {
  if field.many_to_many {
    return Err(Error::UnsupportedFieldKind {
      schema: target.name().into(),
      field:  field.name.clone(),
    });
  }

  if field.auto_identity {
    return Ok(None);
  }

  if field.name == STAGING_ID_FIELD || (expires && field.name == STAGING_EXPIRY_FIELD) {
    return Err(Error::ReservedFieldName {
      schema: target.name().into(),
      field:  field.name.clone(),
    });
  }

  let mut staged = field.clone();

  // The primary key keeps its nullability so its value can be staged ahead
  // of promotion; everything else may be omitted.
  if staged.primary_key {
    staged.primary_key = false;
  } else {
    staged.nullable = true;
  }

  if let Some(fk) = &field.foreign_key {
    staged.foreign_key = Some(rebuild_foreign_key(target, fk));
    staged.indexed = true;
  }

  if staged.unique {
    staged.unique = false;
    staged.indexed = true;
  }

  Ok(Some(staged))
}

/// Staging rows are never the target of a relation and never take part in an
/// inheritance chain. A self reference points at an already-completed row of
/// the target table.
fn rebuild_foreign_key(target: &TargetSchema, fk: &ForeignKey) -> ForeignKey {
  ForeignKey {
    target:       FkTarget::Table(fk.referenced_table(target.table()).to_owned()),
    remote_field: fk.remote_field.clone(),
    on_delete:    fk.on_delete,
    related_name: None,
    one_to_one:   false,
    parent_link:  false,
    serialize:    true,
  }
}
