//! Import and export entry points.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use galley_core::clock::{Clock, SystemClock};
use galley_core::entity::{EntityKind, FieldKind, ReferenceKind};
use galley_core::error::{FormatError, RenderError};
use galley_core::export::{self, ExportFilters, ExportMeta, ExportRow, ReferenceLabels};
use galley_core::format::parse;
use galley_core::policy::{ImportFormat, ImportPolicy};
use galley_core::record::FieldValue;
use galley_core::report::{render_failure, render_summary, AuditEntry, ImportOutcome, RunInfo};
use galley_core::types::{Actor, DbId};

use crate::batch::run_batch;
use crate::sinks::{AuditSink, NotificationSink, TracingAuditSink, TracingNotifier};
use crate::store::{ImportStore, ImportTransaction, StoreError};

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// A run that produced no outcome.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("File is too large ({size} bytes, limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    System(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// One import request, with the payload already read into memory.
#[derive(Debug, Clone)]
pub struct ImportRequest<'a> {
    pub bytes: &'a [u8],
    pub format: ImportFormat,
    pub entity: EntityKind,
    pub policy: ImportPolicy,
    pub actor: Actor,
}

/// The committed result of an import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub run_id: Uuid,
    pub outcome: ImportOutcome,
    pub summary: String,
    /// CSV rows discarded for not matching the header's column count.
    pub dropped_rows: usize,
}

/// A rendered export file.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
    pub count: usize,
}

/// Runs imports and exports against one store.
pub struct ImportService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    max_bytes: usize,
}

impl<S: ImportStore> ImportService<S> {
    /// A service with the system clock, log-backed sinks and the default
    /// upload limit.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            audit: Arc::new(TracingAuditSink),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    // -----------------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------------

    /// Import one payload in a single transaction.
    ///
    /// Sends exactly one notification and one audit entry, whatever the
    /// result.
    pub async fn import(&self, request: ImportRequest<'_>) -> Result<ImportReport, ImportError> {
        let run = RunInfo {
            run_id: Uuid::now_v7(),
            actor: request.actor.clone(),
            entity: request.entity,
            format: request.format,
            policy: request.policy.clone(),
            started_at: self.clock.now(),
        };
        let span = tracing::info_span!(
            "import",
            run_id = %run.run_id,
            entity = %run.entity,
            format = %run.format,
        );

        async {
            let mut dropped_rows = 0;
            let result = self.execute(&request, &mut dropped_rows).await;

            let finished_at = self.clock.now();
            match result {
                Ok(outcome) => {
                    let summary = render_summary(&outcome);
                    tracing::info!(
                        imported = outcome.imported,
                        updated = outcome.updated,
                        skipped = outcome.skipped,
                        restored = outcome.restored,
                        errors = outcome.errors.len(),
                        "Import committed"
                    );
                    self.notifier.notify(&run.actor, &summary).await;
                    self.audit
                        .record(&AuditEntry::committed(run.clone(), &outcome, dropped_rows, finished_at))
                        .await;
                    Ok(ImportReport {
                        run_id: run.run_id,
                        outcome,
                        summary,
                        dropped_rows,
                    })
                }
                Err(err) => {
                    tracing::error!(error = %err, "Import failed");
                    let reason = err.to_string();
                    self.notifier.notify(&run.actor, &render_failure(&reason)).await;
                    self.audit
                        .record(&AuditEntry::failed(run.clone(), reason, dropped_rows, finished_at))
                        .await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &ImportRequest<'_>,
        dropped_rows: &mut usize,
    ) -> Result<ImportOutcome, ImportError> {
        if request.bytes.len() > self.max_bytes {
            return Err(ImportError::PayloadTooLarge {
                size: request.bytes.len(),
                limit: self.max_bytes,
            });
        }

        let payload = parse(request.bytes, request.format, request.entity)?;
        *dropped_rows = payload.dropped_rows;
        if payload.dropped_rows > 0 {
            tracing::warn!(
                dropped_rows = payload.dropped_rows,
                "CSV rows with a mismatched column count were dropped"
            );
        }
        tracing::debug!(records = payload.records.len(), "Payload parsed");

        let mut tx = self.store.begin().await?;
        let batch = run_batch(
            &mut tx,
            request.entity,
            &payload.records,
            &request.policy,
            self.clock.as_ref(),
        )
        .await;

        match batch {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                Err(err.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    /// Render every row of `entity` admitted by `filters`.
    pub async fn export(
        &self,
        entity: EntityKind,
        format: ImportFormat,
        filters: ExportFilters,
        actor: &Actor,
    ) -> Result<ExportFile, ExportError> {
        let rows = self.store.list_records(entity, &filters).await?;
        let labels = self.labels_for(entity, &rows).await?;

        let exported_at = self.clock.now();
        let meta = ExportMeta {
            exported_at,
            exported_by: actor.clone(),
            filters,
        };
        let bytes = export::render(entity, &rows, &labels, format, &meta)?;
        tracing::info!(entity = %entity, format = %format, count = rows.len(), "Export rendered");

        Ok(ExportFile {
            bytes,
            content_type: format.content_type(),
            file_name: export::file_name(entity, format, exported_at),
            count: rows.len(),
        })
    }

    /// Labels for every reference id appearing in `rows`.
    async fn labels_for(
        &self,
        entity: EntityKind,
        rows: &[ExportRow],
    ) -> Result<ReferenceLabels, StoreError> {
        let mut wanted: HashMap<ReferenceKind, BTreeSet<DbId>> = HashMap::new();
        for def in entity.descriptor().fields() {
            let FieldKind::Reference(target) = def.kind else {
                continue;
            };
            let ids = rows
                .iter()
                .filter_map(|row| row.fields.get(def.name).and_then(FieldValue::as_reference));
            wanted.entry(target).or_default().extend(ids);
        }

        let mut labels = ReferenceLabels::new();
        for (kind, ids) in wanted {
            if ids.is_empty() {
                continue;
            }
            let ids: Vec<DbId> = ids.into_iter().collect();
            for (id, label) in self.store.reference_labels(kind, &ids).await? {
                labels.insert((kind, id), label);
            }
        }
        Ok(labels)
    }

    /// Whether the store answers.
    pub async fn healthy(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}
