//! The `StagingStore` trait: the query and promotion surface over one
//! staging schema.
//!
//! The trait is implemented by storage backends (e.g. `shelf-store-sqlite`).
//! Every call goes to the backing store; implementations keep no cache.

use std::future::Future;

use crate::{
  record::{Record, StagingRecord, Value, WrappedRecord},
  staging::StagingSchema,
};

/// Abstraction over the staging records of a single [`StagingSchema`].
///
/// All methods return `Send` futures so stores can be shared across a
/// multi-threaded runtime.
pub trait StagingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn schema(&self) -> &StagingSchema;

  // ── Lifecycle ─────────────────────────────────────────────────────────

  /// Insert a new staging record from a partial set of values. Omitted
  /// fields take their default or `Null`; expiry is stamped when enabled.
  fn create(
    &self,
    values: Record,
  ) -> impl Future<Output = Result<StagingRecord, Self::Error>> + Send + '_;

  /// Stage changes to an existing permanent record: its values are projected
  /// onto the staged fields (see [`StagingSchema::stage_values`]) and
  /// inserted as a new staging record.
  fn create_from_permanent(
    &self,
    permanent: &Record,
  ) -> impl Future<Output = Result<StagingRecord, Self::Error>> + Send + '_ {
    self.create(self.schema().stage_values(permanent))
  }

  /// Persist the in-memory values of an active record. Values are stored in
  /// their normalised form.
  fn save<'a>(
    &'a self,
    record: &'a StagingRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn delete(
    &self,
    staging_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete every record whose expiry lies strictly before now, across the
  /// whole table. Returns the number of records removed.
  ///
  /// Fails with a configuration error when the schema has no expiry.
  fn purge_expired(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// All active records, newest first.
  fn query(
    &self,
  ) -> impl Future<Output = Result<Vec<StagingRecord>, Self::Error>> + Send + '_;

  fn by_staging_id(
    &self,
    staging_id: i64,
  ) -> impl Future<Output = Result<StagingRecord, Self::Error>> + Send + '_;

  /// The latest active record claiming the target primary key `pk`. When
  /// several records claim it, the highest staging id wins.
  ///
  /// Unsupported when the target primary key is an auto identity.
  fn by_target_pk(
    &self,
    pk: Value,
  ) -> impl Future<Output = Result<StagingRecord, Self::Error>> + Send + '_;

  // ── Promotion ─────────────────────────────────────────────────────────

  /// Build the permanent-schema value for `record` without writing it.
  ///
  /// With `populate_relations`, performs one extra read per non-null
  /// foreign-key value to fetch the referenced row.
  fn wrap<'a>(
    &'a self,
    record: &'a StagingRecord,
    populate_relations: bool,
  ) -> impl Future<Output = Result<WrappedRecord, Self::Error>> + Send + 'a;

  /// Validate, insert into the permanent table and clean up the staging
  /// record, all or nothing. Returns the persisted permanent record.
  fn shelve<'a>(
    &'a self,
    record: &'a StagingRecord,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + 'a;
}
