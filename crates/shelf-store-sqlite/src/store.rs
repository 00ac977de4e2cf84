//! [`SqliteDatabase`] and [`SqliteStagingStore`], the SQLite implementation
//! of [`StagingStore`].

use std::{
  collections::BTreeMap,
  path::Path,
  sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, types::Value as SqlValue};
use shelf_core::{
  expiry::{Clock, SystemClock},
  promote::{AcceptAll, Validator, relation_lookups, wrap_values},
  record::{Record, StagingRecord, Value, WrappedRecord},
  registry::Registry,
  schema::TargetSchema,
  staging::{DeriveOptions, STAGING_EXPIRY_FIELD, STAGING_ID_FIELD, StagingSchema},
  store::StagingStore,
};

use crate::{
  Error, Result,
  config::StoreConfig,
  encode::{decode_dt, decode_value, encode_dt, encode_value, ident},
  permanent::{self, fetch_by_column, in_transaction, insert_row, insert_with_ancestors},
  schema::{PRAGMAS, staging_table, target_tables},
};

/// Runs inside the promotion transaction once the permanent row is written.
/// An error rolls the whole promotion back.
pub type CleanupHook = Arc<
  dyn Fn(&Transaction<'_>, &StagingSchema, &StagingRecord) -> Result<()> + Send + Sync,
>;

/// The default [`CleanupHook`]: delete the promoted staging record. A record
/// that no longer exists fails the promotion, so a stale copy cannot be
/// shelved twice.
pub fn delete_staging_record(
  tx: &Transaction<'_>,
  schema: &StagingSchema,
  record: &StagingRecord,
) -> Result<()> {
  delete_staging_row(tx, schema, record.staging_id)
}

// ─── Database ────────────────────────────────────────────────────────────────

/// A SQLite database holding permanent tables and the staging tables
/// registered against them.
///
/// Clones share the connection and registry.
#[derive(Clone)]
pub struct SqliteDatabase {
  conn:     tokio_rusqlite::Connection,
  registry: Arc<Mutex<Registry>>,
  clock:    Arc<dyn Clock>,
}

impl SqliteDatabase {
  /// Open (or create) a database at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory database.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  /// Open the database named by `config.store_path`.
  pub async fn from_config(config: &StoreConfig) -> Result<Self> {
    Self::open(&config.store_path).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      registry: Arc::new(Mutex::new(Registry::new())),
      clock: Arc::new(SystemClock),
    })
  }

  /// Replace the clock used for expiry by stores created afterwards.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Create the tables of `target` and its ancestors if missing.
  pub async fn create_target_table(&self, target: &TargetSchema) -> Result<()> {
    let ddl = target_tables(target);
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Derive the staging schema for `target`, attach it under `name`, create
  /// the permanent and staging tables, and return a store over it.
  ///
  /// Call once per target schema and name; a repeat fails with
  /// `AlreadyRegistered`.
  pub async fn register(
    &self,
    name: &str,
    target: &Arc<TargetSchema>,
    options: &DeriveOptions,
  ) -> Result<SqliteStagingStore> {
    let schema = self
      .registry
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .register(name, target, options)?;

    let ddl = format!("{}{}", target_tables(target), staging_table(&schema));
    let created = self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await;
    if let Err(e) = created {
      // Without its table the schema is unusable; free the name for a retry.
      self
        .registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .unregister(target.table(), name);
      tracing::warn!(
        target_table = target.table(),
        staging_table = schema.table(),
        error = %e,
        "staging table creation failed"
      );
      return Err(e.into());
    }

    tracing::info!(
      target_table = target.table(),
      staging_table = schema.table(),
      registered_as = name,
      expiry = schema.expiry_enabled(),
      "registered staging schema"
    );
    Ok(self.store_for(schema))
  }

  /// A store over a schema registered earlier under `(table, name)`.
  pub fn staging(&self, table: &str, name: &str) -> Result<SqliteStagingStore> {
    let schema = self
      .registry
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .get(table, name)
      .ok_or_else(|| {
        shelf_core::Error::NotFound(format!("staging schema {name:?} for table {table}"))
      })?;
    Ok(self.store_for(schema))
  }

  fn store_for(&self, schema: Arc<StagingSchema>) -> SqliteStagingStore {
    SqliteStagingStore {
      conn: self.conn.clone(),
      schema,
      clock: Arc::clone(&self.clock),
      validator: Arc::new(AcceptAll),
      cleanup: Arc::new(delete_staging_record),
    }
  }

  /// Insert a permanent record through the normal path: missing ancestor
  /// rows of a multi-table inheritance chain are created and linked. Returns
  /// the persisted values of the whole chain.
  pub async fn insert_permanent(
    &self,
    target: &Arc<TargetSchema>,
    values: Record,
  ) -> Result<Record> {
    let target = Arc::clone(target);
    self
      .conn
      .call(move |conn| {
        Ok(in_transaction(conn, |tx| insert_with_ancestors(tx, &target, &values)))
      })
      .await?
  }

  /// Fetch a permanent record by primary key, including the fields of its
  /// ancestors.
  pub async fn fetch_permanent(
    &self,
    target: &Arc<TargetSchema>,
    pk: impl Into<Value>,
  ) -> Result<Option<Record>> {
    let target = Arc::clone(target);
    let pk = pk.into();
    self
      .conn
      .call(move |conn| Ok(permanent::fetch(conn, &target, &pk)))
      .await?
  }
}

// ─── Staging store ───────────────────────────────────────────────────────────

/// Staging records of one [`StagingSchema`], stored in its own table.
///
/// Clones share the connection and hooks.
#[derive(Clone)]
pub struct SqliteStagingStore {
  conn:      tokio_rusqlite::Connection,
  schema:    Arc<StagingSchema>,
  clock:     Arc<dyn Clock>,
  validator: Arc<dyn Validator>,
  cleanup:   CleanupHook,
}

impl SqliteStagingStore {
  /// Validation run on the wrapped value before a promotion writes anything.
  pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
    self.validator = Arc::new(validator);
    self
  }

  /// Replace the post-shelve cleanup (default: [`delete_staging_record`]).
  pub fn with_cleanup(mut self, cleanup: CleanupHook) -> Self {
    self.cleanup = cleanup;
    self
  }

  /// Records are active until their expiry instant, evaluated now.
  fn active_since(&self) -> Option<DateTime<Utc>> {
    self.schema.expiry_enabled().then(|| self.clock.now())
  }

  async fn select(&self, filter: Filter) -> Result<Vec<StagingRecord>> {
    let schema = Arc::clone(&self.schema);
    let active_since = self.active_since();
    self
      .conn
      .call(move |conn| Ok(select_staging(conn, &schema, &filter, active_since)))
      .await?
  }

  fn not_found(&self, what: String) -> Error {
    shelf_core::Error::NotFound(format!("{} {what}", self.schema.name())).into()
  }
}

impl StagingStore for SqliteStagingStore {
  type Error = Error;

  fn schema(&self) -> &StagingSchema { &self.schema }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  async fn create(&self, values: Record) -> Result<StagingRecord> {
    let values = self.schema.initial_values(values)?;
    let expires_at = self
      .schema
      .expiry()
      .map(|policy| {
        policy.expires_at(self.clock.now()).ok_or_else(|| {
          shelf_core::Error::Configuration(format!(
            "{} lifetime {} overflows the expiry timestamp",
            self.schema.name(),
            policy.lifetime
          ))
        })
      })
      .transpose()?;

    let schema = Arc::clone(&self.schema);
    let row = values.clone();
    let staging_id = self
      .conn
      .call(move |conn| Ok(insert_staging(conn, &schema, &row, expires_at)))
      .await??;

    tracing::debug!(table = self.schema.table(), staging_id, "created staging record");
    Ok(StagingRecord { staging_id, expires_at, values })
  }

  async fn save(&self, record: &StagingRecord) -> Result<()> {
    let schema = Arc::clone(&self.schema);
    let row = StagingRecord {
      values: self.schema.normalize(record.values.clone())?,
      ..record.clone()
    };
    let active_since = self.active_since();
    let updated = self
      .conn
      .call(move |conn| Ok(update_staging(conn, &schema, &row, active_since)))
      .await??;

    if updated == 0 {
      return Err(self.not_found(format!("with staging id {}", record.staging_id)));
    }
    Ok(())
  }

  async fn delete(&self, staging_id: i64) -> Result<()> {
    let schema = Arc::clone(&self.schema);
    self
      .conn
      .call(move |conn| Ok(delete_staging_row(conn, &schema, staging_id)))
      .await?
  }

  async fn purge_expired(&self) -> Result<usize> {
    if !self.schema.expiry_enabled() {
      return Err(
        shelf_core::Error::Configuration(format!(
          "{} does not use expiry timestamps",
          self.schema.name()
        ))
        .into(),
      );
    }

    let sql = format!(
      "DELETE FROM {} WHERE {} < ?1",
      ident(self.schema.table()),
      ident(STAGING_EXPIRY_FIELD),
    );
    let now = encode_dt(self.clock.now());
    let purged = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, [now])?))
      .await?;

    tracing::info!(table = self.schema.table(), purged, "purged expired staging records");
    Ok(purged)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn query(&self) -> Result<Vec<StagingRecord>> { self.select(Filter::All).await }

  async fn by_staging_id(&self, staging_id: i64) -> Result<StagingRecord> {
    tracing::debug!(table = self.schema.table(), staging_id, "lookup by staging id");
    self
      .select(Filter::StagingId(staging_id))
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| self.not_found(format!("with staging id {staging_id}")))
  }

  async fn by_target_pk(&self, pk: Value) -> Result<StagingRecord> {
    let Some(field) = self.schema.target_pk_field() else {
      return Err(
        shelf_core::Error::UnsupportedOperation(format!(
          "{} has an auto identity primary key; look records up by staging id",
          self.schema.source().name()
        ))
        .into(),
      );
    };
    if !field.ty.accepts(&pk) {
      return Err(
        shelf_core::Error::TypeMismatch { field: field.name.clone(), expected: field.ty }
          .into(),
      );
    }

    let what = format!("with {} = {pk:?}", field.name);
    self
      .select(Filter::Latest { field: field.name.clone(), value: pk })
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| self.not_found(what))
  }

  // ── Promotion ─────────────────────────────────────────────────────────────

  async fn wrap(
    &self,
    record: &StagingRecord,
    populate_relations: bool,
  ) -> Result<WrappedRecord> {
    let values = wrap_values(&self.schema, record);
    if !populate_relations {
      return Ok(WrappedRecord { values, relations: Default::default() });
    }

    let lookups: Vec<_> = relation_lookups(&self.schema, &values)
      .into_iter()
      .map(|l| {
        (
          l.field.to_owned(),
          l.table.to_owned(),
          l.remote_field.to_owned(),
          l.value.clone(),
          l.schema.cloned(),
        )
      })
      .collect();

    let relations: BTreeMap<String, Record> = self
      .conn
      .call(move |conn| {
        Ok(
          lookups
            .into_iter()
            .map(|(field, table, remote, key, known)| -> Result<(String, Record)> {
              let row = fetch_by_column(conn, &table, known.as_deref(), &remote, &key)?
                .ok_or_else(|| {
                  shelf_core::Error::NotFound(format!("{table} with {remote} = {key:?}"))
                })?;
              Ok((field, row))
            })
            .collect::<Result<BTreeMap<_, _>>>(),
        )
      })
      .await??;

    Ok(WrappedRecord { values, relations })
  }

  async fn shelve(&self, record: &StagingRecord) -> Result<Record> {
    let values = wrap_values(&self.schema, record);
    self
      .validator
      .validate(self.schema.source(), &values)
      .map_err(shelf_core::Error::from)?;

    let schema = Arc::clone(&self.schema);
    let cleanup = Arc::clone(&self.cleanup);
    let staged = record.clone();
    let outcome = self
      .conn
      .call(move |conn| {
        Ok(in_transaction(conn, |tx| {
          let target = schema.source();
          // The raw path: ancestor rows are never created or touched.
          let persisted = if target.has_parents() {
            insert_row(tx, target, &values)?
          } else {
            insert_with_ancestors(tx, target, &values)?
          };
          (*cleanup)(tx, schema.as_ref(), &staged)?;
          Ok(persisted)
        }))
      })
      .await?;

    match &outcome {
      Ok(_) => tracing::info!(
        table = self.schema.table(),
        staging_id = record.staging_id,
        target_table = self.schema.source().table(),
        "shelved staging record"
      ),
      Err(e) => tracing::warn!(
        table = self.schema.table(),
        staging_id = record.staging_id,
        error = %e,
        "shelving rolled back"
      ),
    }
    outcome
  }
}

// ─── Row access ──────────────────────────────────────────────────────────────

enum Filter {
  All,
  StagingId(i64),
  /// Newest record whose `field` equals `value`.
  Latest { field: String, value: Value },
}

fn select_staging(
  conn: &Connection,
  schema: &StagingSchema,
  filter: &Filter,
  active_since: Option<DateTime<Utc>>,
) -> Result<Vec<StagingRecord>> {
  let columns: Vec<_> = schema.columns().collect();
  let mut conditions = Vec::new();
  let mut params = Vec::new();

  if let Some(now) = active_since {
    conditions.push(format!("{} >= ?", ident(STAGING_EXPIRY_FIELD)));
    params.push(SqlValue::Text(encode_dt(now)));
  }
  match filter {
    Filter::All => {}
    Filter::StagingId(id) => {
      conditions.push(format!("{} = ?", ident(STAGING_ID_FIELD)));
      params.push(SqlValue::Integer(*id));
    }
    Filter::Latest { field, value } => {
      conditions.push(format!("{} = ?", ident(field)));
      params.push(encode_value(value));
    }
  }

  let ordering = schema.ordering();
  let mut sql = format!(
    "SELECT {} FROM {}",
    columns.iter().map(|f| ident(&f.name)).collect::<Vec<_>>().join(", "),
    ident(schema.table()),
  );
  if !conditions.is_empty() {
    sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
  }
  sql.push_str(&format!(
    " ORDER BY {} {}",
    ident(&ordering.field),
    if ordering.descending { "DESC" } else { "ASC" },
  ));
  if matches!(filter, Filter::Latest { .. }) {
    sql.push_str(" LIMIT 1");
  }

  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(rusqlite::params_from_iter(params), |row| {
      (0..columns.len()).map(|i| row.get::<_, SqlValue>(i)).collect::<rusqlite::Result<Vec<_>>>()
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws.into_iter().map(|raw| decode_staging(schema, raw)).collect()
}

/// Decode a row selected in [`StagingSchema::columns`] order.
fn decode_staging(schema: &StagingSchema, raw: Vec<SqlValue>) -> Result<StagingRecord> {
  let mut raw = raw.into_iter();
  let staging_id = match raw.next() {
    Some(SqlValue::Integer(id)) => id,
    other => return Err(Error::Decode(format!("staging id {other:?}"))),
  };

  let mut values = Record::new();
  for field in schema.fields() {
    let value = raw.next().unwrap_or(SqlValue::Null);
    values.set(field.name.clone(), decode_value(field.ty, value)?);
  }

  let expires_at = match raw.next() {
    Some(SqlValue::Text(s)) => Some(decode_dt(&s)?),
    _ => None,
  };

  Ok(StagingRecord { staging_id, expires_at, values })
}

fn insert_staging(
  conn: &Connection,
  schema: &StagingSchema,
  values: &Record,
  expires_at: Option<DateTime<Utc>>,
) -> Result<i64> {
  let mut columns: Vec<_> = schema.fields().iter().map(|f| ident(&f.name)).collect();
  let mut params: Vec<_> = schema
    .fields()
    .iter()
    .map(|f| encode_value(values.get(&f.name)))
    .collect();
  if let Some(at) = expires_at {
    columns.push(ident(STAGING_EXPIRY_FIELD));
    params.push(SqlValue::Text(encode_dt(at)));
  }

  let sql = if columns.is_empty() {
    format!("INSERT INTO {} DEFAULT VALUES", ident(schema.table()))
  } else {
    format!(
      "INSERT INTO {} ({}) VALUES ({})",
      ident(schema.table()),
      columns.join(", "),
      vec!["?"; columns.len()].join(", "),
    )
  };
  conn.execute(&sql, rusqlite::params_from_iter(params))?;
  Ok(conn.last_insert_rowid())
}

fn update_staging(
  conn: &Connection,
  schema: &StagingSchema,
  record: &StagingRecord,
  active_since: Option<DateTime<Utc>>,
) -> Result<usize> {
  if schema.fields().is_empty() {
    return Ok(usize::from(
      select_staging(conn, schema, &Filter::StagingId(record.staging_id), active_since)?
        .len()
        == 1,
    ));
  }

  let assignments: Vec<_> = schema
    .fields()
    .iter()
    .map(|f| format!("{} = ?", ident(&f.name)))
    .collect();
  let mut params: Vec<_> = schema
    .fields()
    .iter()
    .map(|f| encode_value(record.get(&f.name)))
    .collect();

  let mut sql = format!(
    "UPDATE {} SET {} WHERE {} = ?",
    ident(schema.table()),
    assignments.join(", "),
    ident(STAGING_ID_FIELD),
  );
  params.push(SqlValue::Integer(record.staging_id));
  if let Some(now) = active_since {
    sql.push_str(&format!(" AND {} >= ?", ident(STAGING_EXPIRY_FIELD)));
    params.push(SqlValue::Text(encode_dt(now)));
  }

  Ok(conn.execute(&sql, rusqlite::params_from_iter(params))?)
}

fn delete_staging_row(conn: &Connection, schema: &StagingSchema, staging_id: i64) -> Result<()> {
  let sql = format!(
    "DELETE FROM {} WHERE {} = ?1",
    ident(schema.table()),
    ident(STAGING_ID_FIELD),
  );
  match conn.execute(&sql, [staging_id])? {
    0 => Err(
      shelf_core::Error::NotFound(format!("{} with staging id {staging_id}", schema.name()))
        .into(),
    ),
    _ => Ok(()),
  }
}
