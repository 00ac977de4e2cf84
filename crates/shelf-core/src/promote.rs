//! Backend-independent half of promotion: turning staged values into a
//! permanent-schema value, and the validation hook run before it is written.

use std::sync::Arc;

use crate::{
  error::ValidationError,
  record::{Record, StagingRecord},
  schema::TargetSchema,
  staging::StagingSchema,
};

// ─── Validation hook ─────────────────────────────────────────────────────────

/// Validation of a fully wrapped permanent-schema value, run before any
/// write of a promotion.
pub trait Validator: Send + Sync {
  fn validate(
    &self,
    target: &TargetSchema,
    values: &Record,
  ) -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
  F: Fn(&TargetSchema, &Record) -> Result<(), ValidationError> + Send + Sync,
{
  fn validate(
    &self,
    target: &TargetSchema,
    values: &Record,
  ) -> Result<(), ValidationError> {
    self(target, values)
  }
}

/// Accepts everything; the permanent table's own constraints still apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
  fn validate(&self, _: &TargetSchema, _: &Record) -> Result<(), ValidationError> {
    Ok(())
  }
}

/// Rejects values that leave a non-nullable local field without a value.
/// Auto identities and fields with a default are exempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFields;

impl Validator for RequiredFields {
  fn validate(
    &self,
    target: &TargetSchema,
    values: &Record,
  ) -> Result<(), ValidationError> {
    let missing = target.fields().iter().find(|f| {
      !f.nullable
        && !f.auto_identity
        && f.default.is_none()
        && values.get(&f.name).is_null()
    });
    match missing {
      Some(field) => Err(ValidationError::field(&field.name, "this field is required")),
      None => Ok(()),
    }
  }
}

// ─── Wrapping ────────────────────────────────────────────────────────────────

/// Build the permanent-schema values for `record`: every local target field
/// except the auto identity, which the store assigns on insert.
///
/// Ancestor fields of a multi-table inheritance chain are not reconstructed;
/// they stay reachable through the parent-link value.
pub fn wrap_values(schema: &StagingSchema, record: &StagingRecord) -> Record {
  schema
    .source()
    .fields()
    .iter()
    .filter(|f| !f.auto_identity && !f.many_to_many)
    .map(|f| (f.name.clone(), record.get(&f.name).clone()))
    .collect()
}

/// A foreign-key value to resolve when relations are populated.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationLookup<'a> {
  pub field:        &'a str,
  pub table:        &'a str,
  pub remote_field: &'a str,
  pub value:        &'a crate::record::Value,
  /// Declared schema of `table`, when it is the target or one of its
  /// ancestors.
  pub schema:       Option<&'a Arc<TargetSchema>>,
}

/// One lookup per non-null foreign-key value in `values`. This bounds the
/// extra reads `wrap` performs when relations are populated.
pub fn relation_lookups<'a>(
  schema: &'a StagingSchema,
  values: &'a Record,
) -> Vec<RelationLookup<'a>> {
  let target = schema.source();
  target
    .fields()
    .iter()
    .filter_map(|f| {
      let fk = f.foreign_key.as_ref().filter(|_| !f.many_to_many)?;
      let value = values.get(&f.name);
      let table = fk.referenced_table(target.table());
      (!value.is_null()).then(|| RelationLookup {
        field: &f.name,
        table,
        remote_field: &fk.remote_field,
        value,
        schema: schema_for_table(target, table),
      })
    })
    .collect()
}

/// `target` or the ancestor that owns `table`.
fn schema_for_table<'a>(
  target: &'a Arc<TargetSchema>,
  table: &str,
) -> Option<&'a Arc<TargetSchema>> {
  if target.table() == table {
    return Some(target);
  }
  target.parents().iter().find_map(|parent| schema_for_table(parent, table))
}
