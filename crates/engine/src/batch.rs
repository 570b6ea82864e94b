//! Batch transaction controller.
//!
//! Drives every parsed record through normalize → resolve references →
//! match → decide → apply, in source order, inside the caller's
//! transaction. Each record's writes sit behind a savepoint:
//!
//! - validation failures and storage rejections are rolled back to the
//!   savepoint, recorded in the outcome, and the run moves on;
//! - any other storage failure is returned immediately and the caller
//!   rolls the whole transaction back.

use std::collections::BTreeSet;

use galley_core::clock::Clock;
use galley_core::entity::EntityKind;
use galley_core::error::ValidationError;
use galley_core::matcher::{match_query, MatchResult};
use galley_core::normalize::normalize;
use galley_core::policy::ImportPolicy;
use galley_core::record::{FieldMap, NormalizationNote, NormalizedRecord, RawRecord};
use galley_core::report::{ImportOutcome, RecordAction};
use galley_core::resolver::{resolve, ResolutionDecision};
use galley_core::types::DbId;

use crate::references::resolve_references;
use crate::store::{ImportTransaction, StoreError};

/// Why a single record did not apply.
#[derive(Debug, thiserror::Error)]
pub enum RecordFailure {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Process `records` for `kind` under `policy`.
///
/// Returns the outcome for the caller to commit, or the systemic storage
/// error that must roll the transaction back.
pub async fn run_batch<T: ImportTransaction>(
    tx: &mut T,
    kind: EntityKind,
    records: &[RawRecord],
    policy: &ImportPolicy,
    clock: &dyn Clock,
) -> Result<ImportOutcome, StoreError> {
    let mut outcome = ImportOutcome::default();

    for (index, raw) in records.iter().enumerate() {
        let normalized = match normalize(raw, kind, clock) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(index, error = %err, "Record failed validation");
                outcome.fail(index, err.to_string());
                continue;
            }
        };
        log_notes(index, &normalized.notes);

        tx.begin_record().await?;
        match apply_record(tx, kind, normalized, policy, clock).await {
            Ok(action) => {
                tx.release_record().await?;
                outcome.record(action);
            }
            Err(RecordFailure::Store(err)) if !err.is_record_level() => {
                tracing::error!(index, error = %err, "Storage failure, aborting import");
                return Err(err);
            }
            Err(failure) => {
                tx.rollback_record().await?;
                tracing::warn!(index, error = %failure, "Record failed");
                outcome.fail(index, failure.to_string());
            }
        }
    }

    Ok(outcome)
}

async fn apply_record<T: ImportTransaction>(
    tx: &mut T,
    kind: EntityKind,
    mut record: NormalizedRecord,
    policy: &ImportPolicy,
    clock: &dyn Clock,
) -> Result<RecordAction, RecordFailure> {
    resolve_references(tx, &mut record, policy).await?;

    let matched: MatchResult = match match_query(kind, &record) {
        Some(query) => tx.find_match(kind, &query).await?.into(),
        None => MatchResult::NotFound,
    };

    let decision = resolve(policy, &matched, &record);
    let existing_id = matched.existing().map(|e| e.id);
    tracing::trace!(decision = decision.as_str(), ?existing_id, "Resolved record");

    apply_decision(tx, kind, &decision, existing_id, &record, clock).await?;
    Ok(RecordAction::from(&decision))
}

async fn apply_decision<T: ImportTransaction>(
    tx: &mut T,
    kind: EntityKind,
    decision: &ResolutionDecision,
    existing_id: Option<DbId>,
    record: &NormalizedRecord,
    clock: &dyn Clock,
) -> Result<(), StoreError> {
    let require_existing = || {
        existing_id.ok_or_else(|| StoreError::Internal("decision needs an existing row".into()))
    };

    match decision {
        ResolutionDecision::Create => {
            tx.insert(kind, &record.fields).await?;
        }
        ResolutionDecision::CreateDeleted => {
            let id = tx.insert(kind, &record.fields).await?;
            tx.soft_delete(kind, id, clock.now()).await?;
        }
        ResolutionDecision::UpdateFull => {
            tx.update(kind, require_existing()?, &record.fields).await?;
        }
        ResolutionDecision::UpdateMergeFields(fields) => {
            let subset = merge_subset(&record.fields, fields);
            tx.update(kind, require_existing()?, &subset).await?;
        }
        ResolutionDecision::Restore => {
            let id = require_existing()?;
            tx.restore(kind, id).await?;
            tx.update(kind, id, &record.fields).await?;
        }
        ResolutionDecision::Skip => {}
    }
    Ok(())
}

fn merge_subset(fields: &FieldMap, names: &BTreeSet<&'static str>) -> FieldMap {
    fields
        .iter()
        .filter(|(name, _)| names.contains(*name))
        .map(|(name, value)| (*name, value.clone()))
        .collect()
}

fn log_notes(index: usize, notes: &[NormalizationNote]) {
    for note in notes {
        match note {
            NormalizationNote::DateFallback { field, value } => {
                tracing::warn!(index, field, value = %value, "Unparseable date replaced with now");
            }
            NormalizationNote::EnumFallback {
                field,
                value,
                fallback,
            } => {
                tracing::debug!(index, field, value = %value, fallback, "Unknown value replaced with default");
            }
        }
    }
}
