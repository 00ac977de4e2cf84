//! SQL schema generation for permanent and staging tables.
//!
//! Every statement is idempotent (`IF NOT EXISTS`), so registering against
//! an existing database file is safe.

use std::fmt::Write as _;

use shelf_core::{
  schema::{FieldDescriptor, OnDelete, TargetSchema},
  staging::StagingSchema,
};

use crate::encode::{ident, sql_type};

/// Executed once at connection startup.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// DDL for `target` and, ancestors first, every table of its inheritance
/// chain.
pub fn target_tables(target: &TargetSchema) -> String {
  let mut ddl = String::new();
  for parent in target.parents() {
    ddl.push_str(&target_tables(parent));
  }
  let fields: Vec<_> = target.fields().iter().filter(|f| !f.many_to_many).collect();
  ddl.push_str(&table(target.table(), &fields));
  ddl
}

/// DDL for a staging table: the synthetic identity, the carried-over fields,
/// and the expiry column when enabled.
pub fn staging_table(schema: &StagingSchema) -> String {
  let columns: Vec<_> = schema.columns().collect();
  table(schema.table(), &columns)
}

fn table(name: &str, fields: &[&FieldDescriptor]) -> String {
  let columns = fields
    .iter()
    .map(|f| format!("    {}", column(name, f)))
    .collect::<Vec<_>>()
    .join(",\n");

  let mut ddl = format!("CREATE TABLE IF NOT EXISTS {} (\n{columns}\n);\n", ident(name));

  for field in fields {
    if field.indexed && !field.unique && !field.primary_key {
      let _ = writeln!(
        ddl,
        "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
        ident(&format!("{name}_{}_idx", field.name)),
        ident(name),
        ident(&field.name),
      );
    }
  }
  ddl
}

fn column(table: &str, field: &FieldDescriptor) -> String {
  let mut def = ident(&field.name);

  if field.auto_identity {
    // Declared type must be exactly INTEGER for a rowid alias; AUTOINCREMENT
    // keeps ids from being reused after deletes.
    def.push_str(" INTEGER PRIMARY KEY AUTOINCREMENT");
    return def;
  }

  if field.primary_key {
    // `INT` rather than `INTEGER` so a caller-supplied key is never replaced
    // by a generated rowid.
    let ty = match sql_type(field.ty) {
      "INTEGER" => "INT",
      other => other,
    };
    let _ = write!(def, " {ty} NOT NULL PRIMARY KEY");
  } else {
    let _ = write!(def, " {}", sql_type(field.ty));
    if !field.nullable {
      def.push_str(" NOT NULL");
    }
    if field.unique {
      def.push_str(" UNIQUE");
    }
  }

  if let Some(fk) = &field.foreign_key {
    let on_delete = match fk.on_delete {
      OnDelete::Cascade => "CASCADE",
      OnDelete::Restrict => "RESTRICT",
      OnDelete::SetNull => "SET NULL",
      OnDelete::NoAction => "NO ACTION",
    };
    let _ = write!(
      def,
      " REFERENCES {} ({}) ON DELETE {on_delete}",
      ident(fk.referenced_table(table)),
      ident(&fk.remote_field),
    );
  }

  def
}
