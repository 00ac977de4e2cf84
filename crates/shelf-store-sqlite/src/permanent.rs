//! Reads and writes against permanent (target) tables.
//!
//! Two insert paths exist. [`insert_row`] writes only the schema's own table
//! and is what promotion uses. [`insert_with_ancestors`] is the normal path
//! for multi-table inheritance: it writes missing ancestor rows first and
//! fills in the parent-link fields.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension as _, Transaction, types::Value as SqlValue};
use shelf_core::{
  record::{Record, Value},
  schema::TargetSchema,
};

use crate::{
  Error, Result,
  encode::{decode_dynamic, decode_value, encode_value, ident},
};

/// Run `f` inside a transaction, committing only if it succeeds.
pub fn in_transaction<T>(
  conn: &mut Connection,
  f: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction()?;
  let out = f(&tx)?;
  tx.commit()?;
  Ok(out)
}

// ─── Inserts ─────────────────────────────────────────────────────────────────

/// Insert one row into `target`'s own table as a fresh row; an existing row
/// at the same key is a constraint violation, never an overwrite.
///
/// Omitted fields take their declared default. An omitted or null auto
/// identity is assigned by the store. Returns the values as persisted.
pub fn insert_row(conn: &Connection, target: &TargetSchema, values: &Record) -> Result<Record> {
  for (name, value) in values {
    let field = target.field(name).ok_or_else(|| shelf_core::Error::UnknownField {
      schema: target.name().into(),
      field:  name.clone(),
    })?;
    if !field.ty.accepts(value) {
      return Err(
        shelf_core::Error::TypeMismatch { field: name.clone(), expected: field.ty }.into(),
      );
    }
  }

  let mut persisted = Record::new();
  let mut auto_identity = None;
  for field in target.fields().iter().filter(|f| !f.many_to_many) {
    let value = match values.get(&field.name) {
      Value::Null if !values.contains(&field.name) => {
        field.default.clone().unwrap_or(Value::Null)
      }
      v => field.ty.coerce(v.clone()),
    };
    if field.auto_identity && value.is_null() {
      auto_identity = Some(field.name.clone());
      continue;
    }
    persisted.set(field.name.clone(), value);
  }

  let columns: Vec<_> = persisted.fields().map(ident).collect();
  let sql = if columns.is_empty() {
    format!("INSERT INTO {} DEFAULT VALUES", ident(target.table()))
  } else {
    format!(
      "INSERT INTO {} ({}) VALUES ({})",
      ident(target.table()),
      columns.join(", "),
      vec!["?"; columns.len()].join(", "),
    )
  };

  let params: Vec<SqlValue> = persisted.iter().map(|(_, v)| encode_value(v)).collect();
  conn.execute(&sql, rusqlite::params_from_iter(params))?;

  if let Some(name) = auto_identity {
    persisted.set(name, conn.last_insert_rowid());
  }
  Ok(persisted)
}

/// Normal insert path. `values` may carry fields of any schema in the
/// inheritance chain. Each ancestor whose parent link is not supplied gets a
/// new row built from its share of the values. Returns the merged values of
/// the whole chain.
pub fn insert_with_ancestors(
  conn: &Connection,
  target: &TargetSchema,
  values: &Record,
) -> Result<Record> {
  let known = chain_fields(target);
  if let Some(unknown) = values.fields().find(|f| !known.contains(*f)) {
    return Err(
      shelf_core::Error::UnknownField {
        schema: target.name().into(),
        field:  unknown.to_owned(),
      }
      .into(),
    );
  }

  let mut merged = Record::new();
  let mut local: Record = values
    .iter()
    .filter(|(name, _)| target.field(name).is_some())
    .map(|(k, v)| (k.clone(), v.clone()))
    .collect();

  for parent in target.parents() {
    let Some(link) = target.parent_link_for(parent) else { continue };
    let remote = link.foreign_key.as_ref().map(|fk| fk.remote_field.as_str());

    if local.get(&link.name).is_null() {
      let parent_fields = chain_fields(parent);
      let share: Record = values
        .iter()
        .filter(|(name, _)| parent_fields.contains(name.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
      let parent_row = insert_with_ancestors(conn, parent, &share)?;
      let key = remote.map_or(Value::Null, |r| parent_row.get(r).clone());
      local.set(link.name.clone(), key);
      merge_into(&mut merged, parent_row);
    } else if let Some(parent_row) = fetch(conn, parent, local.get(&link.name))? {
      merge_into(&mut merged, parent_row);
    }
  }

  let row = insert_row(conn, target, &local)?;
  merge_into(&mut merged, row);
  Ok(merged)
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// Fetch the row of `target` whose primary key is `pk`, merged with the
/// ancestor rows it links to.
pub fn fetch(conn: &Connection, target: &TargetSchema, pk: &Value) -> Result<Option<Record>> {
  let pk_field = target.primary_key_field();
  let fields: Vec<_> = target.fields().iter().filter(|f| !f.many_to_many).collect();
  let columns: Vec<_> = fields.iter().map(|f| ident(&f.name)).collect();
  let sql = format!(
    "SELECT {} FROM {} WHERE {} = ?1",
    columns.join(", "),
    ident(target.table()),
    ident(&pk_field.name),
  );

  let raw: Option<Vec<SqlValue>> = conn
    .query_row(&sql, [encode_value(pk)], |row| {
      (0..fields.len()).map(|i| row.get(i)).collect()
    })
    .optional()?;
  let Some(raw) = raw else { return Ok(None) };

  let mut local = Record::new();
  for (field, value) in fields.iter().zip(raw) {
    local.set(field.name.clone(), decode_value(field.ty, value)?);
  }

  let mut merged = Record::new();
  for parent in target.parents() {
    let Some(link) = target.parent_link_for(parent) else { continue };
    if let Some(parent_row) = fetch(conn, parent, local.get(&link.name))? {
      merge_into(&mut merged, parent_row);
    }
  }
  merge_into(&mut merged, local);
  Ok(Some(merged))
}

/// Fetch a row of `table` by one column. Columns declared by `schema` are
/// decoded by their type; the rest by their storage class.
pub fn fetch_by_column(
  conn: &Connection,
  table: &str,
  schema: Option<&TargetSchema>,
  column: &str,
  key: &Value,
) -> Result<Option<Record>> {
  let sql = format!("SELECT * FROM {} WHERE {} = ?1 LIMIT 1", ident(table), ident(column));
  let mut stmt = conn.prepare(&sql)?;
  let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();

  let raw: Option<Vec<SqlValue>> = stmt
    .query_row([encode_value(key)], |row| {
      (0..names.len()).map(|i| row.get(i)).collect()
    })
    .optional()?;

  raw
    .map(|raw| {
      names
        .into_iter()
        .zip(raw)
        .map(|(name, value)| {
          let value = match schema.and_then(|s| s.field(&name)) {
            Some(field) => decode_value(field.ty, value)?,
            None => decode_dynamic(value)?,
          };
          Ok((name, value))
        })
        .collect::<Result<Record, Error>>()
    })
    .transpose()
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn chain_fields(target: &TargetSchema) -> HashSet<&str> {
  let mut names: HashSet<&str> = target.fields().iter().map(|f| f.name.as_str()).collect();
  for parent in target.parents() {
    names.extend(chain_fields(parent));
  }
  names
}

fn merge_into(merged: &mut Record, row: Record) {
  for (name, value) in row {
    merged.set(name, value);
  }
}
