//! Integration tests for the PostgreSQL import store.
//!
//! Exercises the full engine against a real database to verify that:
//! - Natural-key matches are found case-insensitively and include soft-deleted rows
//! - Live rows win over soft-deleted rows with the same key or label
//! - A constraint violation fails only its own record
//! - Restore clears `deleted_at`
//! - Exports read back what the import wrote

#![cfg(feature = "postgres-tests")]

use assert_matches::assert_matches;
use galley_core::entity::{EntityKind, ReferenceKind};
use galley_core::export::ExportFilters;
use galley_core::matcher::{MatchClause, MatchQuery};
use galley_core::policy::{ConflictResolution, DeletedStatePolicy, ImportFormat, ImportPolicy};
use galley_core::record::{FieldMap, FieldValue};
use galley_core::types::Actor;
use galley_db::repositories::{RecordRepo, ReferenceRepo};
use galley_db::PgImportStore;
use galley_engine::{ImportRequest, ImportService, ImportStore, ImportTransaction};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn service(pool: PgPool) -> ImportService<PgImportStore> {
    ImportService::new(PgImportStore::new(pool))
}

fn request(bytes: &[u8], entity: EntityKind, policy: ImportPolicy) -> ImportRequest<'_> {
    ImportRequest {
        bytes,
        format: ImportFormat::Csv,
        entity,
        policy,
        actor: Actor::named("db-test"),
    }
}

fn org(name: &str) -> FieldMap {
    FieldMap::from([("name", FieldValue::Text(name.to_string()))])
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_find_match_is_case_insensitive(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let id = RecordRepo::insert(&mut conn, EntityKind::Organization, &org("Acme Inc"))
        .await
        .unwrap();

    let query = MatchQuery::any(vec![MatchClause::case_insensitive(
        "name",
        FieldValue::Text("ACME INC".into()),
    )])
    .unwrap();
    let found = RecordRepo::find_match(&mut conn, EntityKind::Organization, &query)
        .await
        .unwrap()
        .expect("match");

    assert_eq!(found.id, id);
    assert!(!found.is_soft_deleted);
    assert_eq!(found.fields["name"], FieldValue::Text("Acme Inc".into()));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_find_match_sees_soft_deleted_rows(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let id = RecordRepo::insert(&mut conn, EntityKind::Organization, &org("Gone Co"))
        .await
        .unwrap();
    RecordRepo::soft_delete(&mut conn, EntityKind::Organization, id, chrono::Utc::now())
        .await
        .unwrap();

    let query = MatchQuery::any(vec![MatchClause::case_insensitive(
        "name",
        FieldValue::Text("gone co".into()),
    )])
    .unwrap();
    let found = RecordRepo::find_match(&mut conn, EntityKind::Organization, &query)
        .await
        .unwrap()
        .expect("match");
    assert!(found.is_soft_deleted);

    // With no live row, a label falls back to the deleted one.
    let label = ReferenceRepo::find_by_label(&mut conn, ReferenceKind::Organization, "Gone Co")
        .await
        .unwrap();
    assert_eq!(label, Some(id));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_live_row_wins_over_soft_deleted_twin(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let deleted = RecordRepo::insert(&mut conn, EntityKind::Organization, &org("Acme"))
        .await
        .unwrap();
    RecordRepo::soft_delete(&mut conn, EntityKind::Organization, deleted, chrono::Utc::now())
        .await
        .unwrap();
    let live = RecordRepo::insert(&mut conn, EntityKind::Organization, &org("Acme"))
        .await
        .unwrap();
    assert!(deleted < live);

    let query = MatchQuery::any(vec![MatchClause::case_insensitive(
        "name",
        FieldValue::Text("acme".into()),
    )])
    .unwrap();
    let found = RecordRepo::find_match(&mut conn, EntityKind::Organization, &query)
        .await
        .unwrap()
        .expect("match");
    assert_eq!(found.id, live);
    assert!(!found.is_soft_deleted);

    let label = ReferenceRepo::find_by_label(&mut conn, ReferenceKind::Organization, "ACME")
        .await
        .unwrap();
    assert_eq!(label, Some(live));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_setting_keys_match_regardless_of_case(pool: PgPool) {
    let service = service(pool.clone());
    let overwrite = ImportPolicy::with_conflict_resolution(ConflictResolution::Overwrite);

    let first: &[u8] = b"key,value,category,type\napp.name,Galley,system,string\n";
    service
        .import(request(first, EntityKind::Setting, overwrite.clone()))
        .await
        .unwrap();

    let second: &[u8] = b"key,value,category,type\nApp.Name,Galley CRM,system,string\n";
    let report = service
        .import(request(second, EntityKind::Setting, overwrite))
        .await
        .unwrap();

    assert!(report.outcome.errors.is_empty());
    assert_eq!((report.outcome.imported, report.outcome.updated), (0, 1));
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_contact_labels_join_names(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let fields = FieldMap::from([
        ("first_name", FieldValue::Text("Jane".into())),
        ("last_name", FieldValue::Text("Doe".into())),
    ]);
    let id = RecordRepo::insert(&mut conn, EntityKind::Contact, &fields)
        .await
        .unwrap();

    let found = ReferenceRepo::find_by_label(&mut conn, ReferenceKind::Contact, "jane doe")
        .await
        .unwrap();
    assert_eq!(found, Some(id));

    let labels = ReferenceRepo::labels(&mut conn, ReferenceKind::Contact, &[id, id + 100])
        .await
        .unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[&id], "Jane Doe");
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_rolled_back_record_leaves_run_usable(pool: PgPool) {
    let store = PgImportStore::new(pool.clone());
    let mut tx = store.begin().await.unwrap();

    tx.begin_record().await.unwrap();
    tx.insert(EntityKind::Organization, &org("First")).await.unwrap();
    tx.release_record().await.unwrap();

    tx.begin_record().await.unwrap();
    let err = tx
        .insert(EntityKind::Organization, &org("first"))
        .await
        .unwrap_err();
    assert!(err.is_record_level(), "unexpected error: {err}");
    tx.rollback_record().await.unwrap();

    tx.begin_record().await.unwrap();
    tx.insert(EntityKind::Organization, &org("Second")).await.unwrap();
    tx.release_record().await.unwrap();
    tx.commit().await.unwrap();

    let rows = store
        .list_records(EntityKind::Organization, &ExportFilters::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_uncommitted_run_writes_nothing(pool: PgPool) {
    let store = PgImportStore::new(pool);
    let mut tx = store.begin().await.unwrap();
    tx.insert(EntityKind::Organization, &org("Phantom")).await.unwrap();
    tx.rollback().await.unwrap();

    let rows = store
        .list_records(EntityKind::Organization, &ExportFilters::default())
        .await
        .unwrap();
    assert!(rows.is_empty());
}

// ---------------------------------------------------------------------------
// Full runs
// ---------------------------------------------------------------------------

const CONTACTS_CSV: &str = "\
first_name,last_name,email,company
Jane,Doe,jane@acme.com,Acme Inc
John,Roe,JANE@ACME.COM,Acme Inc
Ann,Lee,ann@beta.io,Beta LLC
";

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_import_creates_contacts_and_organizations(pool: PgPool) {
    let service = service(pool);
    let report = service
        .import(request(
            CONTACTS_CSV.as_bytes(),
            EntityKind::Contact,
            ImportPolicy::default(),
        ))
        .await
        .unwrap();

    // John matches Jane by email and is skipped under the default policy.
    assert_eq!(report.outcome.imported, 2);
    assert_eq!(report.outcome.skipped, 1);
    assert!(report.outcome.errors.is_empty());

    let orgs = service
        .store()
        .list_records(EntityKind::Organization, &ExportFilters::default())
        .await
        .unwrap();
    assert_eq!(orgs.len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_invalid_setting_fails_only_its_record(pool: PgPool) {
    let csv = "\
key,value,category,setting_type
app.name,Galley,general,string
app.bad,1,nonsense,string
app.port,8080,system,integer
";
    let report = service(pool)
        .import(request(csv.as_bytes(), EntityKind::Setting, ImportPolicy::default()))
        .await
        .unwrap();

    assert_eq!(report.outcome.imported, 2);
    assert_eq!(report.outcome.errors.len(), 1);
    assert_eq!(report.outcome.errors[0].index, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_restore_brings_back_deleted_organization(pool: PgPool) {
    let service = service(pool.clone());
    let mut conn = pool.acquire().await.unwrap();
    let id = RecordRepo::insert(&mut conn, EntityKind::Organization, &org("Acme Inc"))
        .await
        .unwrap();
    RecordRepo::soft_delete(&mut conn, EntityKind::Organization, id, chrono::Utc::now())
        .await
        .unwrap();
    drop(conn);

    let policy = ImportPolicy {
        deleted_state_policy: DeletedStatePolicy::Restore,
        ..ImportPolicy::with_conflict_resolution(ConflictResolution::Overwrite)
    };
    let csv = "name,city\nacme inc,Boston\n";
    let report = service
        .import(request(csv.as_bytes(), EntityKind::Organization, policy))
        .await
        .unwrap();
    assert_eq!(report.outcome.restored, 1);

    let rows = service
        .store()
        .list_records(EntityKind::Organization, &ExportFilters::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
    assert_eq!(rows[0].deleted_at, None);
    assert_eq!(rows[0].fields["city"], FieldValue::Text("Boston".into()));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_export_round_trips_through_import(pool: PgPool) {
    let source = service(pool.clone());
    source
        .import(request(
            CONTACTS_CSV.as_bytes(),
            EntityKind::Contact,
            ImportPolicy::default(),
        ))
        .await
        .unwrap();

    let file = source
        .export(
            EntityKind::Contact,
            ImportFormat::Json,
            ExportFilters::default(),
            &Actor::named("db-test"),
        )
        .await
        .unwrap();
    assert_eq!(file.count, 2);

    // Re-importing the export changes nothing.
    let report = source
        .import(ImportRequest {
            bytes: &file.bytes,
            format: ImportFormat::Json,
            entity: EntityKind::Contact,
            policy: ImportPolicy::default(),
            actor: Actor::named("db-test"),
        })
        .await
        .unwrap();
    assert_eq!(report.outcome.imported, 0);
    assert_eq!(report.outcome.skipped, 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unknown_column_is_rejected(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let fields = FieldMap::from([("owner", FieldValue::Text("x".into()))]);
    let err = RecordRepo::insert(&mut conn, EntityKind::Organization, &fields)
        .await
        .unwrap_err();
    assert_matches!(err, sqlx::Error::ColumnNotFound(_));
}
