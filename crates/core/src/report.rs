//! Import outcome accumulation and result reporting.
//!
//! [`ImportOutcome`] is built incrementally by the batch controller. The
//! render functions and [`AuditEntry`] are pure formatting over it.

use serde::Serialize;
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::policy::{ImportFormat, ImportPolicy};
use crate::resolver::ResolutionDecision;
use crate::types::{Actor, Timestamp};

/// Number of per-record errors listed in a rendered summary.
pub const MAX_DISPLAYED_ERRORS: usize = 5;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A record that failed, by 0-based position in the parsed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordError {
    pub index: usize,
    pub message: String,
}

/// Which counter an applied record lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Imported,
    Updated,
    Skipped,
    Restored,
}

impl From<&ResolutionDecision> for RecordAction {
    fn from(decision: &ResolutionDecision) -> Self {
        match decision {
            ResolutionDecision::Create | ResolutionDecision::CreateDeleted => Self::Imported,
            ResolutionDecision::UpdateFull | ResolutionDecision::UpdateMergeFields(_) => Self::Updated,
            ResolutionDecision::Skip => Self::Skipped,
            ResolutionDecision::Restore => Self::Restored,
        }
    }
}

/// Counters and per-record errors for one committed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub restored: usize,
    pub errors: Vec<RecordError>,
}

impl ImportOutcome {
    pub fn record(&mut self, action: RecordAction) {
        match action {
            RecordAction::Imported => self.imported += 1,
            RecordAction::Updated => self.updated += 1,
            RecordAction::Skipped => self.skipped += 1,
            RecordAction::Restored => self.restored += 1,
        }
    }

    pub fn fail(&mut self, index: usize, message: impl Into<String>) {
        self.errors.push(RecordError {
            index,
            message: message.into(),
        });
    }

    /// Records that made it through to a decision.
    pub fn applied(&self) -> usize {
        self.imported + self.updated + self.skipped + self.restored
    }

    /// Every record seen, applied or failed.
    pub fn total(&self) -> usize {
        self.applied() + self.errors.len()
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// `"N imported, M updated, K skipped, R restored"`, followed by the first
/// [`MAX_DISPLAYED_ERRORS`] errors and a count of the rest.
pub fn render_summary(outcome: &ImportOutcome) -> String {
    let mut summary = format!(
        "{} imported, {} updated, {} skipped, {} restored",
        outcome.imported, outcome.updated, outcome.skipped, outcome.restored
    );

    if outcome.errors.is_empty() {
        return summary;
    }

    let noun = if outcome.errors.len() == 1 { "error" } else { "errors" };
    summary.push_str(&format!("; {} {noun}:", outcome.errors.len()));
    for error in outcome.errors.iter().take(MAX_DISPLAYED_ERRORS) {
        summary.push_str(&format!("\n- Record {}: {}", error.index, error.message));
    }
    let hidden = outcome.errors.len().saturating_sub(MAX_DISPLAYED_ERRORS);
    if hidden > 0 {
        summary.push_str(&format!("\n- and {hidden} more"));
    }
    summary
}

/// The notification text for a run that produced no outcome.
pub fn render_failure(reason: &str) -> String {
    format!("Import failed: {reason}")
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Identity and inputs of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub actor: Actor,
    pub entity: EntityKind,
    pub format: ImportFormat,
    pub policy: ImportPolicy,
    pub started_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Committed,
    Failed,
}

/// Structured record of one run, handed to the audit sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    #[serde(flatten)]
    pub run: RunInfo,
    pub status: RunStatus,
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub restored: usize,
    pub error_count: usize,
    /// CSV rows discarded for a column-count mismatch.
    pub dropped_rows: usize,
    pub failure: Option<String>,
    pub finished_at: Timestamp,
}

impl AuditEntry {
    pub fn committed(
        run: RunInfo,
        outcome: &ImportOutcome,
        dropped_rows: usize,
        finished_at: Timestamp,
    ) -> Self {
        Self {
            run,
            status: RunStatus::Committed,
            imported: outcome.imported,
            updated: outcome.updated,
            skipped: outcome.skipped,
            restored: outcome.restored,
            error_count: outcome.errors.len(),
            dropped_rows,
            failure: None,
            finished_at,
        }
    }

    pub fn failed(
        run: RunInfo,
        reason: impl Into<String>,
        dropped_rows: usize,
        finished_at: Timestamp,
    ) -> Self {
        Self {
            run,
            status: RunStatus::Failed,
            imported: 0,
            updated: 0,
            skipped: 0,
            restored: 0,
            error_count: 0,
            dropped_rows,
            failure: Some(reason.into()),
            finished_at,
        }
    }
}
