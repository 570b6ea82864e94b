//! Storage seam.
//!
//! The engine reconciles against any store that can open one transaction
//! per run, execute natural-key lookups inside it, and isolate a single
//! record's writes behind a savepoint. The PostgreSQL adapter lives in
//! `galley-db`; an in-process store lives in [`crate::testing`].

use std::collections::HashMap;

use async_trait::async_trait;

use galley_core::entity::{EntityKind, ReferenceKind};
use galley_core::export::{ExportFilters, ExportRow};
use galley_core::matcher::{ExistingEntity, MatchQuery};
use galley_core::record::FieldMap;
use galley_core::types::{DbId, Timestamp};

/// Storage failures, split by blast radius.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store refused this record's write (constraint, length or type
    /// violation). Recorded against the record; the run continues.
    #[error("Rejected by storage: {0}")]
    Rejected(String),

    /// The store cannot be reached. Aborts and rolls back the run.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Anything else the store reports. Aborts and rolls back the run.
    #[error("Storage error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the error is confined to one record.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A store the engine can import into and export from.
#[async_trait]
pub trait ImportStore: Send + Sync + 'static {
    type Tx: ImportTransaction;

    /// Open the single transaction an import run executes in.
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Rows of `kind` admitted by `filters`, ordered by id.
    async fn list_records(
        &self,
        kind: EntityKind,
        filters: &ExportFilters,
    ) -> StoreResult<Vec<ExportRow>>;

    /// Display labels for reference ids. Unknown ids are left out.
    async fn reference_labels(
        &self,
        kind: ReferenceKind,
        ids: &[DbId],
    ) -> StoreResult<HashMap<DbId, String>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Operations available inside an import run's transaction.
///
/// Nothing written through a transaction is visible outside it until
/// [`commit`](Self::commit).
#[async_trait]
pub trait ImportTransaction: Send {
    /// The first row of `kind` satisfying `query`, including soft-deleted
    /// rows for families that have them. Live rows come first, then the
    /// lowest id.
    async fn find_match(
        &mut self,
        kind: EntityKind,
        query: &MatchQuery,
    ) -> StoreResult<Option<ExistingEntity>>;

    /// A row of `kind` whose label equals `label`, case-insensitively.
    /// A live row wins; otherwise the lowest-id soft-deleted one.
    async fn find_reference(&mut self, kind: ReferenceKind, label: &str)
        -> StoreResult<Option<DbId>>;

    async fn insert(&mut self, kind: EntityKind, fields: &FieldMap) -> StoreResult<DbId>;

    /// Write `fields` over row `id`. Fields not in the map keep their value.
    async fn update(&mut self, kind: EntityKind, id: DbId, fields: &FieldMap) -> StoreResult<()>;

    async fn soft_delete(&mut self, kind: EntityKind, id: DbId, at: Timestamp) -> StoreResult<()>;

    async fn restore(&mut self, kind: EntityKind, id: DbId) -> StoreResult<()>;

    /// Open a savepoint for one record.
    async fn begin_record(&mut self) -> StoreResult<()>;

    /// Keep the record's writes and drop its savepoint.
    async fn release_record(&mut self) -> StoreResult<()>;

    /// Undo the record's writes back to its savepoint.
    async fn rollback_record(&mut self) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}
