//! Interactions: calls, visits, tastings and other touchpoints.
//!
//! Interactions have no natural unique identifier, so they are matched on
//! subject plus calendar day. References are looked up only; an unknown
//! organization or contact fails the record instead of creating one.

use crate::entity::{
    EntityDescriptor, EntityKind, FieldDef, FieldKind, MissingReference, ReferenceDef,
    ReferenceKind,
};
use crate::matcher::{MatchClause, MatchQuery};
use crate::record::NormalizedRecord;

pub const INTERACTION_TYPES: &[&str] = &[
    "CALL",
    "EMAIL",
    "MEETING",
    "VISIT",
    "DEMO",
    "SAMPLE",
    "FOLLOW_UP",
    "OTHER",
];

pub const INTERACTION_OUTCOMES: &[&str] = &["POSITIVE", "NEUTRAL", "NEGATIVE", "PENDING"];

const FIELDS: &[FieldDef] = &[
    FieldDef::required("subject", FieldKind::Text),
    FieldDef::required(
        "interaction_type",
        FieldKind::Enum {
            allowed: INTERACTION_TYPES,
            fallback: Some("OTHER"),
        },
    ),
    FieldDef::timestamp_or_now("interaction_date"),
    FieldDef::optional(
        "outcome",
        FieldKind::Enum {
            allowed: INTERACTION_OUTCOMES,
            fallback: None,
        },
    ),
    FieldDef::optional("duration_minutes", FieldKind::Integer),
    FieldDef::optional("follow_up_required", FieldKind::Boolean),
    FieldDef::optional("follow_up_date", FieldKind::Timestamp),
    FieldDef::optional("description", FieldKind::Text),
    FieldDef::optional(
        "organization_id",
        FieldKind::Reference(ReferenceKind::Organization),
    ),
    FieldDef::optional("contact_id", FieldKind::Reference(ReferenceKind::Contact)),
];

const REFERENCES: &[ReferenceDef] = &[
    ReferenceDef {
        field: "organization_id",
        source: "organization_name",
        target: ReferenceKind::Organization,
        on_missing: MissingReference::Reject,
        uses_default: true,
    },
    ReferenceDef {
        field: "contact_id",
        source: "contact_name",
        target: ReferenceKind::Contact,
        on_missing: MissingReference::Reject,
        uses_default: false,
    },
];

const ALIASES: &[(&str, &str)] = &[
    ("type", "interaction_type"),
    ("kind", "interaction_type"),
    ("date", "interaction_date"),
    ("occurred_at", "interaction_date"),
    ("title", "subject"),
    ("company", "organization_name"),
    ("organization", "organization_name"),
    ("organisation", "organization_name"),
    ("contact", "contact_name"),
    ("contact_full_name", "contact_name"),
    ("duration", "duration_minutes"),
    ("follow_up", "follow_up_required"),
    ("notes", "description"),
    ("result", "outcome"),
];

pub struct InteractionDescriptor;

impl EntityDescriptor for InteractionDescriptor {
    fn kind(&self) -> EntityKind {
        EntityKind::Interaction
    }

    fn fields(&self) -> &'static [FieldDef] {
        FIELDS
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        ALIASES
    }

    fn references(&self) -> &'static [ReferenceDef] {
        REFERENCES
    }

    fn natural_key(&self, record: &NormalizedRecord) -> Option<MatchQuery> {
        let subject = record.get("subject")?;
        let date = record.get("interaction_date")?;
        MatchQuery::all(vec![
            MatchClause::exact("subject", subject.clone()),
            MatchClause::same_day("interaction_date", date.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::matcher::Comparison;
    use crate::record::FieldValue;

    #[test]
    fn natural_key_is_subject_and_day() {
        let mut record = NormalizedRecord::default();
        record.set("subject", FieldValue::Text("Menu tasting".into()));
        record.set(
            "interaction_date",
            FieldValue::Timestamp(chrono::Utc.with_ymd_and_hms(2026, 5, 1, 14, 0, 0).unwrap()),
        );

        let query = InteractionDescriptor.natural_key(&record).unwrap();
        assert_eq!(query.clauses[0].comparison, Comparison::Exact);
        assert_eq!(query.clauses[1].comparison, Comparison::SameDay);
    }

    #[test]
    fn references_are_lookup_only() {
        assert!(InteractionDescriptor
            .references()
            .iter()
            .all(|r| r.on_missing == MissingReference::Reject));
    }
}
