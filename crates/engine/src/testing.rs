//! In-process store and recording sinks.
//!
//! [`MemoryStore`] keeps every table in memory and gives each transaction a
//! private copy that replaces the shared state on commit, so uncommitted
//! writes are never visible. It enforces the uniqueness rules of the SQL
//! schema (organization name and email, contact email, setting key, all
//! case-insensitive among live rows) and can be told to start failing after
//! a number of writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use galley_core::clock::{Clock, SystemClock};
use galley_core::entity::{EntityKind, ReferenceKind};
use galley_core::export::{ExportFilters, ExportRow};
use galley_core::matcher::{ExistingEntity, MatchQuery};
use galley_core::record::{FieldMap, FieldValue};
use galley_core::report::AuditEntry;
use galley_core::types::{Actor, DbId, Timestamp};

use crate::references::target_entity;
use crate::sinks::{AuditSink, NotificationSink};
use crate::store::{ImportStore, ImportTransaction, StoreError, StoreResult};

/// Case-insensitive unique columns among live rows.
const UNIQUE_COLUMNS: &[(EntityKind, &str)] = &[
    (EntityKind::Organization, "name"),
    (EntityKind::Organization, "email"),
    (EntityKind::Contact, "email"),
    (EntityKind::Setting, "key"),
];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemoryRow {
    pub fields: FieldMap,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<EntityKind, BTreeMap<DbId, MemoryRow>>,
    next_id: DbId,
}

impl Tables {
    fn table(&self, kind: EntityKind) -> impl Iterator<Item = (&DbId, &MemoryRow)> {
        self.rows.get(&kind).into_iter().flat_map(|t| t.iter())
    }

    fn row_mut(&mut self, kind: EntityKind, id: DbId) -> StoreResult<&mut MemoryRow> {
        self.rows
            .get_mut(&kind)
            .and_then(|t| t.get_mut(&id))
            .ok_or_else(|| StoreError::Internal(format!("{kind} {id} does not exist")))
    }

    /// Reject `fields` on row `id` if they collide with another live row.
    fn check_unique(&self, kind: EntityKind, id: DbId, fields: &FieldMap) -> StoreResult<()> {
        for &(table, column) in UNIQUE_COLUMNS {
            if table != kind {
                continue;
            }
            let Some(value) = fields.get(column).and_then(FieldValue::as_str) else {
                continue;
            };
            let clash = self.table(kind).any(|(other_id, row)| {
                *other_id != id
                    && row.deleted_at.is_none()
                    && row
                        .fields
                        .get(column)
                        .and_then(FieldValue::as_str)
                        .is_some_and(|v| v.to_lowercase() == value.to_lowercase())
            });
            if clash {
                return Err(StoreError::Rejected(format!(
                    "duplicate value for {}.{column}: '{value}'",
                    kind.plural()
                )));
            }
        }
        Ok(())
    }
}

fn text<'a>(row: &'a MemoryRow, name: &str) -> Option<&'a str> {
    row.fields.get(name).and_then(FieldValue::as_str)
}

fn label_of(kind: ReferenceKind, row: &MemoryRow) -> Option<String> {
    match kind {
        ReferenceKind::Organization => text(row, "name").map(str::to_string),
        ReferenceKind::Contact => match (text(row, "first_name"), text(row, "last_name")) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        },
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// Writes allowed before every operation fails as unavailable.
    writes_before_failure: Option<usize>,
    unavailable: bool,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A shareable in-memory store. Clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables {
                rows: HashMap::new(),
                next_id: 1,
            })),
            faults: Arc::default(),
            clock,
        }
    }

    /// Insert a committed row directly, bypassing the engine.
    pub fn seed(&self, kind: EntityKind, fields: FieldMap) -> DbId {
        let mut tables = lock(&self.tables);
        let id = tables.next_id;
        tables.next_id += 1;
        let row = MemoryRow {
            fields,
            created_at: self.clock.now(),
            deleted_at: None,
        };
        tables.rows.entry(kind).or_default().insert(id, row);
        id
    }

    /// Soft-delete a committed row directly.
    pub fn seed_deleted(&self, kind: EntityKind, id: DbId, at: Timestamp) {
        if let Ok(row) = lock(&self.tables).row_mut(kind, id) {
            row.deleted_at = Some(at);
        }
    }

    /// Committed rows of `kind`, including soft-deleted ones, by id.
    pub fn rows(&self, kind: EntityKind) -> Vec<(DbId, MemoryRow)> {
        lock(&self.tables)
            .table(kind)
            .map(|(id, row)| (*id, row.clone()))
            .collect()
    }

    pub fn row(&self, kind: EntityKind, id: DbId) -> Option<MemoryRow> {
        lock(&self.tables)
            .rows
            .get(&kind)
            .and_then(|t| t.get(&id))
            .cloned()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        lock(&self.tables).table(kind).count()
    }

    /// Allow `writes` more writes in each later transaction, then fail every
    /// operation with [`StoreError::Unavailable`].
    pub fn fail_after_writes(&self, writes: usize) {
        lock(&self.faults).writes_before_failure = Some(writes);
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.faults).unavailable = unavailable;
    }

    fn check_available(&self) -> StoreResult<()> {
        if lock(&self.faults).unavailable {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ImportStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        self.check_available()?;
        Ok(MemoryTx {
            working: lock(&self.tables).clone(),
            savepoints: Vec::new(),
            writes: 0,
            store: self.clone(),
        })
    }

    async fn list_records(
        &self,
        kind: EntityKind,
        filters: &ExportFilters,
    ) -> StoreResult<Vec<ExportRow>> {
        self.check_available()?;
        Ok(lock(&self.tables)
            .table(kind)
            .map(|(id, row)| ExportRow {
                id: *id,
                fields: row.fields.clone(),
                created_at: row.created_at,
                deleted_at: row.deleted_at,
            })
            .filter(|row| filters.admits(kind, row))
            .collect())
    }

    async fn reference_labels(
        &self,
        kind: ReferenceKind,
        ids: &[DbId],
    ) -> StoreResult<HashMap<DbId, String>> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(tables
            .table(target_entity(kind))
            .filter(|(id, _)| ids.contains(id))
            .filter_map(|(id, row)| label_of(kind, row).map(|label| (*id, label)))
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A private copy of the tables, published on commit.
pub struct MemoryTx {
    store: MemoryStore,
    working: Tables,
    savepoints: Vec<Tables>,
    writes: usize,
}

impl MemoryTx {
    fn check(&self) -> StoreResult<()> {
        self.store.check_available()?;
        match lock(&self.store.faults).writes_before_failure {
            Some(limit) if self.writes >= limit => {
                Err(StoreError::Unavailable("connection lost".into()))
            }
            _ => Ok(()),
        }
    }

    fn write(&mut self) -> StoreResult<()> {
        self.check()?;
        self.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl ImportTransaction for MemoryTx {
    async fn find_match(
        &mut self,
        kind: EntityKind,
        query: &MatchQuery,
    ) -> StoreResult<Option<ExistingEntity>> {
        self.check()?;
        Ok(self
            .working
            .table(kind)
            .filter(|(_, row)| query.matches(&row.fields))
            .min_by_key(|(id, row)| (row.deleted_at.is_some(), **id))
            .map(|(id, row)| ExistingEntity {
                id: *id,
                is_soft_deleted: row.deleted_at.is_some(),
                fields: row.fields.clone(),
            }))
    }

    async fn find_reference(
        &mut self,
        kind: ReferenceKind,
        label: &str,
    ) -> StoreResult<Option<DbId>> {
        self.check()?;
        let label = label.trim().to_lowercase();
        Ok(self
            .working
            .table(target_entity(kind))
            .filter(|(_, row)| label_of(kind, row).is_some_and(|l| l.to_lowercase() == label))
            .min_by_key(|(id, row)| (row.deleted_at.is_some(), **id))
            .map(|(id, _)| *id))
    }

    async fn insert(&mut self, kind: EntityKind, fields: &FieldMap) -> StoreResult<DbId> {
        self.write()?;
        let id = self.working.next_id;
        self.working.check_unique(kind, id, fields)?;
        self.working.next_id += 1;
        let row = MemoryRow {
            fields: fields.clone(),
            created_at: self.store.clock.now(),
            deleted_at: None,
        };
        self.working.rows.entry(kind).or_default().insert(id, row);
        Ok(id)
    }

    async fn update(&mut self, kind: EntityKind, id: DbId, fields: &FieldMap) -> StoreResult<()> {
        self.write()?;
        let mut merged = self.working.row_mut(kind, id)?.fields.clone();
        merged.extend(fields.iter().map(|(k, v)| (*k, v.clone())));
        self.working.check_unique(kind, id, &merged)?;
        self.working.row_mut(kind, id)?.fields = merged;
        Ok(())
    }

    async fn soft_delete(&mut self, kind: EntityKind, id: DbId, at: Timestamp) -> StoreResult<()> {
        self.write()?;
        self.working.row_mut(kind, id)?.deleted_at = Some(at);
        Ok(())
    }

    async fn restore(&mut self, kind: EntityKind, id: DbId) -> StoreResult<()> {
        self.write()?;
        let fields = self.working.row_mut(kind, id)?.fields.clone();
        self.working.check_unique(kind, id, &fields)?;
        self.working.row_mut(kind, id)?.deleted_at = None;
        Ok(())
    }

    async fn begin_record(&mut self) -> StoreResult<()> {
        self.check()?;
        self.savepoints.push(self.working.clone());
        Ok(())
    }

    async fn release_record(&mut self) -> StoreResult<()> {
        self.check()?;
        self.savepoints.pop();
        Ok(())
    }

    async fn rollback_record(&mut self) -> StoreResult<()> {
        self.check()?;
        if let Some(saved) = self.savepoints.pop() {
            self.working = saved;
        }
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.check()?;
        *lock(&self.store.tables) = self.working;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Keeps every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(Actor, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn actors(&self) -> Vec<Actor> {
        lock(&self.messages).iter().map(|(a, _)| a.clone()).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, actor: &Actor, message: &str) {
        lock(&self.messages).push((actor.clone(), message.to_string()));
    }
}

/// Keeps every audit entry it receives.
#[derive(Debug, Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    pub fn entries(&self) -> Vec<AuditEntry> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record(&self, entry: &AuditEntry) {
        lock(&self.entries).push(entry.clone());
    }
}
