//! Foreign-key resolution: labels to ids, inside the run's transaction.

use galley_core::entity::{EntityKind, MissingReference, ReferenceKind};
use galley_core::error::ValidationError;
use galley_core::policy::ImportPolicy;
use galley_core::record::{FieldMap, FieldValue, NormalizedRecord};
use galley_core::types::DbId;

use crate::batch::RecordFailure;
use crate::store::ImportTransaction;

/// The entity family a reference points into.
pub fn target_entity(kind: ReferenceKind) -> EntityKind {
    match kind {
        ReferenceKind::Organization => EntityKind::Organization,
        ReferenceKind::Contact => EntityKind::Contact,
    }
}

/// Fields for a row created on the fly from a reference label.
///
/// Contacts split the label at its last space; a single word is used as
/// both first and last name.
pub fn fields_from_label(kind: ReferenceKind, label: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    match kind {
        ReferenceKind::Organization => {
            fields.insert("name", FieldValue::Text(label.to_string()));
        }
        ReferenceKind::Contact => {
            let (first, last) = label.rsplit_once(' ').unwrap_or((label, label));
            fields.insert("first_name", FieldValue::Text(first.trim().to_string()));
            fields.insert("last_name", FieldValue::Text(last.trim().to_string()));
        }
    }
    fields
}

/// Replace every pending reference on `record` with a resolved id.
///
/// Missing targets are created or rejected per the reference's rule. A
/// reference without a label falls back to the policy's default
/// organization when the rule allows it, and is left unset otherwise.
pub async fn resolve_references<T: ImportTransaction>(
    tx: &mut T,
    record: &mut NormalizedRecord,
    policy: &ImportPolicy,
) -> Result<(), RecordFailure> {
    let pending = std::mem::take(&mut record.references);

    for reference in &pending {
        let def = reference.def;
        let id = match reference.label.as_deref() {
            Some(label) => Some(lookup_or_create(tx, def.target, def.on_missing, label).await?),
            None if def.uses_default && def.target == ReferenceKind::Organization => {
                policy.default_organization_id
            }
            None => None,
        };
        if let Some(id) = id {
            record.set(def.field, FieldValue::Reference(id));
        }
    }

    record.references = pending;
    Ok(())
}

async fn lookup_or_create<T: ImportTransaction>(
    tx: &mut T,
    target: ReferenceKind,
    on_missing: MissingReference,
    label: &str,
) -> Result<DbId, RecordFailure> {
    if let Some(id) = tx.find_reference(target, label).await? {
        return Ok(id);
    }

    match on_missing {
        MissingReference::Create => {
            let id = tx
                .insert(target_entity(target), &fields_from_label(target, label))
                .await?;
            tracing::debug!(kind = %target, label, id, "Created referenced entity");
            Ok(id)
        }
        MissingReference::Reject => Err(ValidationError::UnresolvedReference {
            kind: target.as_str(),
            label: label.to_string(),
        }
        .into()),
    }
}
