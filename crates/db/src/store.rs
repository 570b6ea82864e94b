//! PostgreSQL implementation of the engine's storage seam.

use std::collections::HashMap;

use async_trait::async_trait;
use galley_core::entity::{EntityKind, ReferenceKind};
use galley_core::export::{ExportFilters, ExportRow};
use galley_core::matcher::{ExistingEntity, MatchQuery};
use galley_core::record::FieldMap;
use galley_core::types::{DbId, Timestamp};
use galley_engine::{ImportStore, ImportTransaction, StoreResult};
use sqlx::{Postgres, Transaction};

use crate::error::classify;
use crate::repositories::{RecordRepo, ReferenceRepo};
use crate::DbPool;

const SAVEPOINT: &str = "import_record";

/// Import store backed by a connection pool.
#[derive(Debug, Clone)]
pub struct PgImportStore {
    pool: DbPool,
}

impl PgImportStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ImportStore for PgImportStore {
    type Tx = PgImportTx;

    async fn begin(&self) -> StoreResult<PgImportTx> {
        let tx = self.pool.begin().await.map_err(classify)?;
        Ok(PgImportTx { tx })
    }

    async fn list_records(
        &self,
        kind: EntityKind,
        filters: &ExportFilters,
    ) -> StoreResult<Vec<ExportRow>> {
        let mut conn = self.pool.acquire().await.map_err(classify)?;
        RecordRepo::list(&mut conn, kind, filters)
            .await
            .map_err(classify)
    }

    async fn reference_labels(
        &self,
        kind: ReferenceKind,
        ids: &[DbId],
    ) -> StoreResult<HashMap<DbId, String>> {
        let mut conn = self.pool.acquire().await.map_err(classify)?;
        ReferenceRepo::labels(&mut conn, kind, ids)
            .await
            .map_err(classify)
    }

    async fn ping(&self) -> StoreResult<()> {
        crate::health_check(&self.pool).await.map_err(classify)
    }
}

/// One import run's transaction. Dropping it without commit rolls back.
pub struct PgImportTx {
    tx: Transaction<'static, Postgres>,
}

impl PgImportTx {
    async fn execute(&mut self, statement: &str) -> StoreResult<()> {
        sqlx::query(statement)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

#[async_trait]
impl ImportTransaction for PgImportTx {
    async fn find_match(
        &mut self,
        kind: EntityKind,
        query: &MatchQuery,
    ) -> StoreResult<Option<ExistingEntity>> {
        RecordRepo::find_match(&mut self.tx, kind, query)
            .await
            .map_err(classify)
    }

    async fn find_reference(
        &mut self,
        kind: ReferenceKind,
        label: &str,
    ) -> StoreResult<Option<DbId>> {
        ReferenceRepo::find_by_label(&mut self.tx, kind, label)
            .await
            .map_err(classify)
    }

    async fn insert(&mut self, kind: EntityKind, fields: &FieldMap) -> StoreResult<DbId> {
        RecordRepo::insert(&mut self.tx, kind, fields)
            .await
            .map_err(classify)
    }

    async fn update(&mut self, kind: EntityKind, id: DbId, fields: &FieldMap) -> StoreResult<()> {
        RecordRepo::update(&mut self.tx, kind, id, fields)
            .await
            .map_err(classify)
    }

    async fn soft_delete(&mut self, kind: EntityKind, id: DbId, at: Timestamp) -> StoreResult<()> {
        RecordRepo::soft_delete(&mut self.tx, kind, id, at)
            .await
            .map_err(classify)
    }

    async fn restore(&mut self, kind: EntityKind, id: DbId) -> StoreResult<()> {
        RecordRepo::restore(&mut self.tx, kind, id)
            .await
            .map_err(classify)
    }

    async fn begin_record(&mut self) -> StoreResult<()> {
        self.execute(&format!("SAVEPOINT {SAVEPOINT}")).await
    }

    async fn release_record(&mut self) -> StoreResult<()> {
        self.execute(&format!("RELEASE SAVEPOINT {SAVEPOINT}")).await
    }

    async fn rollback_record(&mut self) -> StoreResult<()> {
        tracing::debug!(savepoint = SAVEPOINT, "Rolling back record");
        self.execute(&format!("ROLLBACK TO SAVEPOINT {SAVEPOINT}"))
            .await?;
        self.execute(&format!("RELEASE SAVEPOINT {SAVEPOINT}")).await
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await.map_err(classify)
    }
}
