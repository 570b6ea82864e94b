//! Conflict resolution: what to do with one normalized record.
//!
//! [`resolve`] is a pure function of the policy, the match result and the
//! record. It is the only place that decides between creating, updating,
//! restoring and skipping.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::matcher::MatchResult;
use crate::policy::{ConflictResolution, DeletedStatePolicy, ImportPolicy};
use crate::record::NormalizedRecord;

/// The action chosen for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "fields", rename_all = "snake_case")]
pub enum ResolutionDecision {
    Create,
    /// Create, then soft-delete the new row.
    CreateDeleted,
    /// Write every incoming field over the existing row.
    UpdateFull,
    /// Write only these fields; each is empty on the existing row.
    UpdateMergeFields(BTreeSet<&'static str>),
    Skip,
    /// Clear the soft-delete marker, then write every incoming field.
    Restore,
}

impl ResolutionDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateDeleted => "create_deleted",
            Self::UpdateFull => "update_full",
            Self::UpdateMergeFields(_) => "update_merge_fields",
            Self::Skip => "skip",
            Self::Restore => "restore",
        }
    }
}

/// Decide the action for `record` given the lookup result.
pub fn resolve(
    policy: &ImportPolicy,
    matched: &MatchResult,
    record: &NormalizedRecord,
) -> ResolutionDecision {
    let Some(existing) = matched.existing() else {
        return if record.marked_deleted
            && policy.deleted_state_policy == DeletedStatePolicy::KeepDeleted
        {
            ResolutionDecision::CreateDeleted
        } else {
            ResolutionDecision::Create
        };
    };

    if existing.is_soft_deleted {
        return match (policy.deleted_state_policy, record.marked_deleted) {
            (DeletedStatePolicy::Ignore, _) => ResolutionDecision::Skip,
            (DeletedStatePolicy::Restore, false) => ResolutionDecision::Restore,
            (DeletedStatePolicy::Restore, true) => ResolutionDecision::Skip,
            (DeletedStatePolicy::KeepDeleted, true) => ResolutionDecision::UpdateFull,
            (DeletedStatePolicy::KeepDeleted, false) => ResolutionDecision::Skip,
        };
    }

    match policy.conflict_resolution {
        ConflictResolution::Skip => ResolutionDecision::Skip,
        ConflictResolution::Overwrite => ResolutionDecision::UpdateFull,
        ConflictResolution::Merge => {
            let fields: BTreeSet<&'static str> = record
                .fields
                .keys()
                .copied()
                .filter(|name| existing.fields.get(name).is_none_or(|v| v.is_empty()))
                .collect();
            if fields.is_empty() {
                ResolutionDecision::Skip
            } else {
                ResolutionDecision::UpdateMergeFields(fields)
            }
        }
    }
}
