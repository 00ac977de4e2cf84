//! Integration tests for the SQLite staging store against in-memory
//! databases.

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use chrono::{TimeDelta, TimeZone, Utc};
use rusqlite::Transaction;
use shelf_core::{
  expiry::ManualClock,
  promote::RequiredFields,
  record::{Record, StagingRecord, Value},
  schema::{FieldDescriptor, FieldType, ForeignKey, TargetSchema},
  staging::{DeriveOptions, StagingSchema, TableNaming},
  store::StagingStore,
};

use crate::{
  CleanupHook, Error, SqliteDatabase, SqliteStagingStore, StoreConfig, delete_staging_record,
};

async fn db() -> SqliteDatabase {
  SqliteDatabase::open_in_memory()
    .await
    .expect("in-memory database")
}

fn core(err: &Error) -> &shelf_core::Error {
  err
    .as_core()
    .unwrap_or_else(|| panic!("expected a core error, got {err}"))
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// `{a: int non-null, b: text, pk: int}` with a caller-supplied key.
fn t_schema() -> Arc<TargetSchema> {
  Arc::new(
    TargetSchema::new("T", "t", vec![
      FieldDescriptor::new("a", FieldType::Integer),
      FieldDescriptor::new("b", FieldType::Text),
      FieldDescriptor::new("pk", FieldType::Integer)
        .as_primary_key()
        .with_default(1),
    ])
    .unwrap(),
  )
}

/// Auto identity plus two required columns.
fn entry_schema() -> Arc<TargetSchema> {
  Arc::new(
    TargetSchema::new("Entry", "entries", vec![
      FieldDescriptor::auto_id("id"),
      FieldDescriptor::new("column1", FieldType::Integer),
      FieldDescriptor::new("column2", FieldType::Text),
    ])
    .unwrap(),
  )
}

fn node_schema() -> Arc<TargetSchema> {
  Arc::new(
    TargetSchema::new("Node", "nodes", vec![
      FieldDescriptor::auto_id("id"),
      FieldDescriptor::new("slug", FieldType::Text).as_unique(),
      FieldDescriptor::new("parent", FieldType::Integer)
        .optional()
        .with_foreign_key(ForeignKey::to_self("id").related_name("children")),
    ])
    .unwrap(),
  )
}

fn user_schema() -> Arc<TargetSchema> {
  Arc::new(
    TargetSchema::new("User", "users", vec![
      FieldDescriptor::auto_id("id"),
      FieldDescriptor::new("email", FieldType::Text),
      FieldDescriptor::new("somenumber", FieldType::Integer),
    ])
    .unwrap(),
  )
}

fn profile_schema(user: Arc<TargetSchema>) -> Arc<TargetSchema> {
  Arc::new(
    TargetSchema::new("Profile", "profiles", vec![
      FieldDescriptor::new("user_ptr", FieldType::Integer)
        .as_primary_key()
        .with_foreign_key(ForeignKey::parent_link("users", "id")),
      FieldDescriptor::new("username", FieldType::Text),
      FieldDescriptor::new("street_address", FieldType::Text),
      FieldDescriptor::new("postal_code", FieldType::Integer),
    ])
    .unwrap()
    .inherits(user)
    .unwrap(),
  )
}

/// Typed columns plus a self reference.
fn task_schema() -> Arc<TargetSchema> {
  Arc::new(
    TargetSchema::new("Task", "tasks", vec![
      FieldDescriptor::auto_id("id"),
      FieldDescriptor::new("title", FieldType::Text),
      FieldDescriptor::new("done", FieldType::Boolean).with_default(false),
      FieldDescriptor::new("due", FieldType::Timestamp).optional(),
      FieldDescriptor::new("estimate", FieldType::Real).optional(),
      FieldDescriptor::new("blocked_by", FieldType::Integer)
        .optional()
        .with_foreign_key(ForeignKey::to_self("id")),
    ])
    .unwrap(),
  )
}

async fn staging(db: &SqliteDatabase, target: &Arc<TargetSchema>) -> SqliteStagingStore {
  db.register("partial", target, &DeriveOptions::default())
    .await
    .expect("register")
}

// ─── Creation and lookup ─────────────────────────────────────────────────────

#[tokio::test]
async fn partial_record_round_trips() {
  let db = db().await;
  let store = staging(&db, &t_schema()).await;

  let created = store.create(Record::new().with("b", "x")).await.unwrap();
  let fetched = store.by_staging_id(created.staging_id).await.unwrap();

  assert_eq!(fetched, created);
  assert_eq!(fetched.get("b").as_str(), Some("x"));
  assert!(fetched.get("a").is_null());
  assert_eq!(fetched.get("pk").as_i64(), Some(1));
  assert_eq!(fetched.expires_at, None);
}

#[tokio::test]
async fn values_read_back_exactly_as_created() {
  let db = db().await;
  let store = staging(&db, &task_schema()).await;
  let due = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    + TimeDelta::nanoseconds(123_456_789);

  let created = store
    .create(Record::new().with("title", "write").with("due", due).with("estimate", 3))
    .await
    .unwrap();
  assert_eq!(created.get("estimate"), &Value::Real(3.0));

  let fetched = store.by_staging_id(created.staging_id).await.unwrap();
  assert_eq!(fetched, created);
  assert_eq!(fetched.get("due").as_timestamp(), Some(due));

  let mut edited = fetched;
  edited.set("estimate", 5);
  store.save(&edited).await.unwrap();
  assert_eq!(
    store.by_staging_id(edited.staging_id).await.unwrap().get("estimate"),
    &Value::Real(5.0)
  );

  let shelved = store.shelve(&edited).await.unwrap();
  assert_eq!(shelved.get("estimate"), &Value::Real(5.0));
  assert_eq!(shelved.get("due").as_timestamp(), Some(due));
}

#[tokio::test]
async fn create_rejects_unknown_fields() {
  let db = db().await;
  let store = staging(&db, &entry_schema()).await;

  let err = store
    .create(Record::new().with("id", 4))
    .await
    .unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::UnknownField { .. }));
}

#[tokio::test]
async fn query_returns_newest_first() {
  let db = db().await;
  let store = staging(&db, &entry_schema()).await;

  let first = store.create(Record::new().with("column1", 1)).await.unwrap();
  let second = store.create(Record::new().with("column1", 2)).await.unwrap();

  let all = store.query().await.unwrap();
  let ids: Vec<_> = all.iter().map(|r| r.staging_id).collect();
  assert_eq!(ids, [second.staging_id, first.staging_id]);
}

#[tokio::test]
async fn save_and_delete() {
  let db = db().await;
  let store = staging(&db, &entry_schema()).await;

  let mut record = store.create(Record::new().with("column2", "abc")).await.unwrap();
  record.set("column1", 9);
  store.save(&record).await.unwrap();
  assert_eq!(
    store.by_staging_id(record.staging_id).await.unwrap().get("column1"),
    &Value::Integer(9)
  );

  store.delete(record.staging_id).await.unwrap();
  let err = store.by_staging_id(record.staging_id).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::NotFound(_)));

  let err = store.delete(record.staging_id).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::NotFound(_)));
  let err = store.save(&record).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::NotFound(_)));
}

#[tokio::test]
async fn staging_ids_are_not_reused() {
  let db = db().await;
  let store = staging(&db, &entry_schema()).await;

  let first = store.create(Record::new()).await.unwrap();
  store.delete(first.staging_id).await.unwrap();
  let second = store.create(Record::new()).await.unwrap();

  assert!(second.staging_id > first.staging_id);
}

// ─── Lookup by target primary key ────────────────────────────────────────────

#[tokio::test]
async fn by_target_pk_prefers_the_latest_record() {
  let db = db().await;
  let store = staging(&db, &t_schema()).await;

  store
    .create(Record::new().with("pk", 7).with("b", "older"))
    .await
    .unwrap();
  let newer = store
    .create(Record::new().with("pk", 7).with("b", "newer"))
    .await
    .unwrap();
  store.create(Record::new().with("pk", 8)).await.unwrap();

  let found = store.by_target_pk(Value::Integer(7)).await.unwrap();
  assert_eq!(found.staging_id, newer.staging_id);
  assert_eq!(found.get("b").as_str(), Some("newer"));

  let err = store.by_target_pk(Value::Integer(99)).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::NotFound(_)));
}

#[tokio::test]
async fn by_target_pk_is_unsupported_for_auto_identity() {
  let db = db().await;
  let store = staging(&db, &entry_schema()).await;

  let err = store.by_target_pk(Value::Integer(1)).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::UnsupportedOperation(_)));
}

// ─── Expiry ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_records_are_hidden_and_purged() {
  let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
  let clock = Arc::new(ManualClock::new(t0));
  let db = db().await.with_clock(clock.clone());
  let store = db
    .register(
      "partial",
      &entry_schema(),
      &DeriveOptions::default().with_lifetime(TimeDelta::days(3)),
    )
    .await
    .unwrap();

  let old = store.create(Record::new().with("column1", 1)).await.unwrap();
  assert_eq!(old.expires_at, Some(t0 + TimeDelta::days(3)));

  clock.advance(TimeDelta::days(2));
  let fresh = store.create(Record::new().with("column1", 2)).await.unwrap();

  // `old` expired a day ago; `fresh` has a day left.
  clock.advance(TimeDelta::days(2));
  let active = store.query().await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].staging_id, fresh.staging_id);

  let err = store.by_staging_id(old.staging_id).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::NotFound(_)));

  assert_eq!(store.purge_expired().await.unwrap(), 1);
  assert_eq!(store.purge_expired().await.unwrap(), 0);

  // Rewinding proves the expired row is gone rather than filtered.
  clock.set(t0);
  let remaining = store.query().await.unwrap();
  assert_eq!(remaining.len(), 1);
  assert_eq!(remaining[0].staging_id, fresh.staging_id);
}

#[tokio::test]
async fn record_is_active_at_its_expiry_instant() {
  let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
  let clock = Arc::new(ManualClock::new(t0));
  let db = db().await.with_clock(clock.clone());
  let store = db
    .register(
      "partial",
      &entry_schema(),
      &DeriveOptions::default().with_lifetime(TimeDelta::hours(1)),
    )
    .await
    .unwrap();

  let record = store.create(Record::new()).await.unwrap();
  clock.advance(TimeDelta::hours(1));

  assert!(store.by_staging_id(record.staging_id).await.is_ok());
  assert_eq!(store.purge_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn unrepresentable_expiry_is_a_configuration_error() {
  let db = db().await;
  let store = db
    .register(
      "partial",
      &entry_schema(),
      &DeriveOptions::default().with_lifetime(TimeDelta::MAX),
    )
    .await
    .unwrap();

  let err = store.create(Record::new()).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::Configuration(_)));
  assert!(store.query().await.unwrap().is_empty());
}

#[tokio::test]
async fn purge_requires_expiry() {
  let db = db().await;
  let store = staging(&db, &entry_schema()).await;

  let err = store.purge_expired().await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::Configuration(_)));
}

// ─── Promotion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn permanent_table_rejects_incomplete_rows() {
  let db = db().await;
  let target = t_schema();
  db.create_target_table(&target).await.unwrap();

  let err = db
    .insert_permanent(&target, Record::new().with("b", "x"))
    .await
    .unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::Integrity(_)));
}

#[tokio::test]
async fn stage_complete_and_shelve() {
  let db = db().await;
  let target = t_schema();
  let store = staging(&db, &target).await;

  let created = store.create(Record::new().with("b", "x")).await.unwrap();

  let mut record = store.by_staging_id(created.staging_id).await.unwrap();
  record.set("a", 5);
  store.save(&record).await.unwrap();

  let shelved = store.shelve(&record).await.unwrap();
  assert_eq!(shelved, Record::new().with("a", 5).with("b", "x").with("pk", 1));

  let permanent = db.fetch_permanent(&target, 1).await.unwrap().unwrap();
  assert_eq!(permanent, shelved);

  let err = store.by_staging_id(created.staging_id).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::NotFound(_)));
}

#[tokio::test]
async fn shelve_uses_in_memory_values_and_assigns_identity() {
  let db = db().await;
  let target = entry_schema();
  let store = staging(&db, &target).await;

  let mut record = store.create(Record::new().with("column2", "abcde")).await.unwrap();
  record.set("column1", 5);

  let shelved = store.shelve(&record).await.unwrap();
  let id = shelved.get("id").as_i64().expect("assigned identity");

  let permanent = db.fetch_permanent(&target, id).await.unwrap().unwrap();
  assert_eq!(permanent.get("column1").as_i64(), Some(5));
  assert_eq!(permanent.get("column2").as_str(), Some("abcde"));
  assert!(store.query().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_validation_writes_nothing() {
  let db = db().await;
  let target = t_schema();
  let store = staging(&db, &target).await.with_validator(RequiredFields);

  let record = store.create(Record::new().with("b", "x")).await.unwrap();

  let err = store.shelve(&record).await.unwrap_err();
  assert!(matches!(
    core(&err),
    shelf_core::Error::Validation(v) if v.field.as_deref() == Some("a")
  ));

  assert!(db.fetch_permanent(&target, 1).await.unwrap().is_none());
  assert_eq!(store.by_staging_id(record.staging_id).await.unwrap(), record);
}

#[tokio::test]
async fn occupied_primary_key_rolls_back() {
  let db = db().await;
  let target = t_schema();
  let store = staging(&db, &target).await;

  db.insert_permanent(&target, Record::new().with("a", 1).with("b", "first"))
    .await
    .unwrap();

  let record = store
    .create(Record::new().with("a", 2).with("b", "second"))
    .await
    .unwrap();
  let err = store.shelve(&record).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::Integrity(_)));

  let permanent = db.fetch_permanent(&target, 1).await.unwrap().unwrap();
  assert_eq!(permanent.get("b").as_str(), Some("first"));
  assert_eq!(store.by_staging_id(record.staging_id).await.unwrap(), record);
}

#[tokio::test]
async fn stale_copy_cannot_be_shelved_twice() {
  let db = db().await;
  let target = entry_schema();
  let store = staging(&db, &target).await;

  let record = store
    .create(Record::new().with("column1", 1).with("column2", "x"))
    .await
    .unwrap();
  let first = store.shelve(&record).await.unwrap();

  let err = store.shelve(&record).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::NotFound(_)));

  // The second insert was rolled back along with the failed cleanup.
  let next_id = first.get("id").as_i64().unwrap() + 1;
  assert!(db.fetch_permanent(&target, next_id).await.unwrap().is_none());
}

#[tokio::test]
async fn failing_cleanup_rolls_back_the_insert() {
  let db = db().await;
  let target = entry_schema();
  let failing: CleanupHook = Arc::new(
    |_: &Transaction<'_>, _: &StagingSchema, _: &StagingRecord| -> crate::Result<()> {
      Err(shelf_core::Error::Integrity("archive unavailable".into()).into())
    },
  );
  let store = staging(&db, &target).await.with_cleanup(failing);

  let record = store
    .create(Record::new().with("column1", 1).with("column2", "x"))
    .await
    .unwrap();
  assert!(store.shelve(&record).await.is_err());

  assert!(db.fetch_permanent(&target, 1).await.unwrap().is_none());
  assert!(store.by_staging_id(record.staging_id).await.is_ok());
}

#[tokio::test]
async fn custom_cleanup_runs_once_per_shelve() {
  let db = db().await;
  let calls = Arc::new(AtomicUsize::new(0));
  let counted = Arc::clone(&calls);
  let counting: CleanupHook = Arc::new(
    move |tx: &Transaction<'_>, schema: &StagingSchema, record: &StagingRecord| {
      counted.fetch_add(1, Ordering::SeqCst);
      delete_staging_record(tx, schema, record)
    },
  );
  let store = staging(&db, &entry_schema()).await.with_cleanup(counting);

  let record = store
    .create(Record::new().with("column1", 1).with("column2", "x"))
    .await
    .unwrap();
  store.shelve(&record).await.unwrap();

  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert!(store.query().await.unwrap().is_empty());
}

// ─── Relations and uniqueness ────────────────────────────────────────────────

#[tokio::test]
async fn self_reference_targets_permanent_rows() {
  let db = db().await;
  let target = node_schema();
  let store = staging(&db, &target).await;

  let root = db
    .insert_permanent(&target, Record::new().with("slug", "root"))
    .await
    .unwrap();
  let root_id = root.get("id").as_i64().unwrap();

  let child = store
    .create(Record::new().with("slug", "child").with("parent", root_id))
    .await
    .unwrap();

  // A staging id is not a valid referent.
  let err = store
    .create(Record::new().with("parent", child.staging_id + 100))
    .await
    .unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::Integrity(_)));

  let wrapped = store.wrap(&child, true).await.unwrap();
  assert_eq!(wrapped.relations["parent"].get("slug").as_str(), Some("root"));

  let unpopulated = store.wrap(&child, false).await.unwrap();
  assert!(unpopulated.relations.is_empty());
  assert_eq!(unpopulated.values.get("parent").as_i64(), Some(root_id));
}

#[tokio::test]
async fn uniqueness_is_enforced_only_on_promotion() {
  let db = db().await;
  let store = staging(&db, &node_schema()).await;

  let first = store.create(Record::new().with("slug", "same")).await.unwrap();
  let second = store.create(Record::new().with("slug", "same")).await.unwrap();

  store.shelve(&first).await.unwrap();
  let err = store.shelve(&second).await.unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::Integrity(_)));
  assert!(store.by_staging_id(second.staging_id).await.is_ok());
}

#[tokio::test]
async fn populated_relations_use_declared_types() {
  let db = db().await;
  let target = task_schema();
  let store = staging(&db, &target).await;
  let due = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

  let blocker = db
    .insert_permanent(
      &target,
      Record::new().with("title", "first").with("done", true).with("due", due),
    )
    .await
    .unwrap();

  let record = store
    .create(Record::new().with("title", "second").with("blocked_by", blocker.get("id").clone()))
    .await
    .unwrap();

  let wrapped = store.wrap(&record, true).await.unwrap();
  let related = &wrapped.relations["blocked_by"];
  assert_eq!(related.get("done"), &Value::Boolean(true));
  assert_eq!(related.get("due"), &Value::Timestamp(due));
  assert!(related.get("estimate").is_null());
}

// ─── Staging changes to permanent records ────────────────────────────────────

#[tokio::test]
async fn permanent_record_can_be_staged_again() {
  let db = db().await;
  let target = entry_schema();
  let store = staging(&db, &target).await;

  let original = db
    .insert_permanent(&target, Record::new().with("column1", 1).with("column2", "abc"))
    .await
    .unwrap();
  assert!(original.contains("id"));

  let mut staged = store.create_from_permanent(&original).await.unwrap();
  assert_eq!(staged.values, Record::new().with("column1", 1).with("column2", "abc"));

  staged.set("column1", 2);
  let copy = store.shelve(&staged).await.unwrap();
  assert_ne!(copy.get("id"), original.get("id"));
  assert_eq!(copy.get("column1").as_i64(), Some(2));
}

#[tokio::test]
async fn inherited_permanent_record_is_staged_by_its_link() {
  let db = db().await;
  let user = user_schema();
  let profile = profile_schema(Arc::clone(&user));
  let store = staging(&db, &profile).await;

  let existing = db
    .insert_permanent(
      &profile,
      Record::new()
        .with("email", "abc@example.com")
        .with("somenumber", 5)
        .with("username", "abc")
        .with("street_address", "5 ABC St.")
        .with("postal_code", 20312),
    )
    .await
    .unwrap();

  let staged = store.create_from_permanent(&existing).await.unwrap();
  assert!(!staged.values.contains("email"));
  assert!(!staged.values.contains("id"));
  assert_eq!(staged.get("user_ptr"), existing.get("user_ptr"));
  assert_eq!(staged.get("username").as_str(), Some("abc"));
}

// ─── Multi-table inheritance ─────────────────────────────────────────────────

#[tokio::test]
async fn child_record_is_staged_against_an_existing_parent() {
  let db = db().await;
  let user = user_schema();
  let profile = profile_schema(Arc::clone(&user));
  let store = staging(&db, &profile).await;

  let existing = db
    .insert_permanent(
      &user,
      Record::new().with("email", "abc@example.com").with("somenumber", 5),
    )
    .await
    .unwrap();
  let user_id = existing.get("id").as_i64().unwrap();

  let created = store
    .create(Record::new().with("username", "abc").with("user_ptr", user_id))
    .await
    .unwrap();
  let mut record = store.by_staging_id(created.staging_id).await.unwrap();
  assert_eq!(record.get("user_ptr").as_i64(), Some(user_id));

  // Parent attributes are only reachable through the relation.
  let wrapped = store.wrap(&record, true).await.unwrap();
  assert!(!wrapped.values.contains("email"));
  assert_eq!(
    wrapped.relations["user_ptr"].get("email").as_str(),
    Some("abc@example.com")
  );

  record.set("street_address", "5 ABC St.");
  record.set("postal_code", 20312);
  store.shelve(&record).await.unwrap();

  let shelved = db.fetch_permanent(&profile, user_id).await.unwrap().unwrap();
  assert_eq!(shelved.get("postal_code").as_i64(), Some(20312));
  assert_eq!(shelved.get("email").as_str(), Some("abc@example.com"));
  assert!(store.query().await.unwrap().is_empty());

  // The raw path left the parent row alone.
  let parent = db.fetch_permanent(&user, user_id).await.unwrap().unwrap();
  assert_eq!(parent, existing);
}

#[tokio::test]
async fn normal_insert_creates_ancestor_rows() {
  let db = db().await;
  let user = user_schema();
  let profile = profile_schema(Arc::clone(&user));
  db.create_target_table(&profile).await.unwrap();

  let merged = db
    .insert_permanent(
      &profile,
      Record::new()
        .with("email", "new@example.com")
        .with("somenumber", 1)
        .with("username", "new")
        .with("street_address", "1 Main St.")
        .with("postal_code", 10001),
    )
    .await
    .unwrap();

  let user_id = merged.get("user_ptr").as_i64().expect("linked parent");
  assert_eq!(merged.get("id").as_i64(), Some(user_id));

  let parent = db.fetch_permanent(&user, user_id).await.unwrap().unwrap();
  assert_eq!(parent.get("email").as_str(), Some("new@example.com"));
}

// ─── Registration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn registration_happens_once() {
  let db = db().await;
  let target = entry_schema();
  let store = staging(&db, &target).await;
  store.create(Record::new().with("column1", 3)).await.unwrap();

  let err = db
    .register("partial", &target, &DeriveOptions::default())
    .await
    .err()
    .expect("second registration fails");
  assert!(matches!(core(&err), shelf_core::Error::AlreadyRegistered { .. }));

  let again = db.staging("entries", "partial").unwrap();
  assert_eq!(again.query().await.unwrap().len(), 1);
  assert!(db.staging("entries", "missing").is_err());
}

#[tokio::test]
async fn failed_table_creation_frees_the_name() {
  let db = db().await;
  let target = entry_schema();
  let reserved = DeriveOptions::default().with_table_naming(TableNaming::Custom(Arc::new(
    |_: &TargetSchema| "sqlite_reserved".to_owned(),
  )));

  assert!(db.register("partial", &target, &reserved).await.is_err());
  assert!(db.staging("entries", "partial").is_err());

  let store = staging(&db, &target).await;
  store.create(Record::new().with("column1", 1)).await.unwrap();
  assert_eq!(db.staging("entries", "partial").unwrap().query().await.unwrap().len(), 1);
}

#[tokio::test]
async fn many_to_many_targets_cannot_be_registered() {
  let db = db().await;
  let target = Arc::new(
    TargetSchema::new("Post", "posts", vec![
      FieldDescriptor::auto_id("id"),
      FieldDescriptor::many_to_many("tags", "tags"),
    ])
    .unwrap(),
  );

  let err = db
    .register("partial", &target, &DeriveOptions::default())
    .await
    .err()
    .expect("derivation fails");
  assert!(matches!(core(&err), shelf_core::Error::UnsupportedFieldKind { .. }));
  assert!(db.staging("posts", "partial").is_err());
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[tokio::test]
async fn config_file_drives_derivation() {
  let dir = tempfile::tempdir().unwrap();
  let store_path = dir.path().join("store.sqlite3");
  let config_path = dir.path().join("shelf.toml");
  std::fs::write(
    &config_path,
    format!(
      "store_path = {:?}\nstaging_lifetime_secs = 60\ntable_suffix = \"_draft\"\n",
      store_path.to_string_lossy()
    ),
  )
  .unwrap();

  let config = StoreConfig::load(&config_path).unwrap();
  assert_eq!(config.store_path, store_path);
  let options = config.derive_options().unwrap();
  assert_eq!(options.lifetime, Some(TimeDelta::seconds(60)));

  let db = SqliteDatabase::from_config(&config).await.unwrap();
  let store = db.register("partial", &entry_schema(), &options).await.unwrap();
  assert_eq!(store.schema().table(), "entries_draft");
  assert!(store.schema().expiry_enabled());
}

#[test]
fn out_of_range_lifetime_is_rejected() {
  let config = StoreConfig {
    staging_lifetime_secs: Some(i64::MAX),
    ..StoreConfig::default()
  };
  let err = config.derive_options().unwrap_err();
  assert!(matches!(core(&err), shelf_core::Error::Configuration(_)));
}

#[test]
fn missing_config_file_yields_defaults() {
  let dir = tempfile::tempdir().unwrap();
  let config = StoreConfig::load(dir.path().join("absent.toml")).unwrap();
  assert_eq!(config, StoreConfig::default());
  assert_eq!(config.derive_options().unwrap().lifetime, None);
}
