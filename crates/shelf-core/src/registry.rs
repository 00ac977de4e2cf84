//! Explicit registration of staging schemas.
//!
//! The owner of a target schema registers it once under a name of its
//! choosing; the derived schema is attached to `(target table, name)` and
//! handed back for building a store.

use std::{collections::HashMap, sync::Arc};

use crate::{
  Error, Result,
  schema::TargetSchema,
  staging::{DeriveOptions, StagingSchema, derive},
};

#[derive(Debug, Default)]
pub struct Registry {
  schemas: HashMap<(String, String), Arc<StagingSchema>>,
}

impl Registry {
  pub fn new() -> Self { Self::default() }

  /// Derive and attach the staging schema for `target` under `name`.
  ///
  /// Derivation runs at most once per pair; a second registration fails with
  /// [`Error::AlreadyRegistered`] and leaves the first in place.
  pub fn register(
    &mut self,
    name: &str,
    target: &Arc<TargetSchema>,
    options: &DeriveOptions,
  ) -> Result<Arc<StagingSchema>> {
    let key = (target.table().to_owned(), name.to_owned());
    if self.schemas.contains_key(&key) {
      return Err(Error::AlreadyRegistered { table: key.0, name: key.1 });
    }

    let schema = Arc::new(derive(target, options)?);
    if self.schemas.values().any(|s| s.table() == schema.table()) {
      return Err(Error::Configuration(format!(
        "staging table {} is already in use",
        schema.table()
      )));
    }
    self.schemas.insert(key, Arc::clone(&schema));
    Ok(schema)
  }

  pub fn get(&self, table: &str, name: &str) -> Option<Arc<StagingSchema>> {
    self
      .schemas
      .get(&(table.to_owned(), name.to_owned()))
      .cloned()
  }

  /// Detach the schema registered under `(table, name)`, if any.
  pub fn unregister(&mut self, table: &str, name: &str) -> Option<Arc<StagingSchema>> {
    self.schemas.remove(&(table.to_owned(), name.to_owned()))
  }

  pub fn len(&self) -> usize { self.schemas.len() }

  pub fn is_empty(&self) -> bool { self.schemas.is_empty() }
}
