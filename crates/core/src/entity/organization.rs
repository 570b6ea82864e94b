//! Organizations: operators, distributors and principals.

use crate::entity::{EntityDescriptor, EntityKind, FieldDef, FieldKind};
use crate::matcher::{MatchClause, MatchQuery};
use crate::record::NormalizedRecord;

/// Market segments an operator can belong to.
pub const ORGANIZATION_SEGMENTS: &[&str] = &[
    "FINE_DINING",
    "CASUAL_DINING",
    "FAST_CASUAL",
    "QSR",
    "INSTITUTIONAL",
    "CATERING",
    "DISTRIBUTOR",
    "OTHER",
];

/// Account priority tiers.
pub const ORGANIZATION_PRIORITIES: &[&str] = &["A", "B", "C", "D"];

const FIELDS: &[FieldDef] = &[
    FieldDef::required("name", FieldKind::Text),
    FieldDef::optional("email", FieldKind::Email),
    FieldDef::optional("phone", FieldKind::Text),
    FieldDef::optional("website", FieldKind::Text),
    FieldDef::optional("address", FieldKind::Text),
    FieldDef::optional("city", FieldKind::Text),
    FieldDef::optional("state", FieldKind::Text),
    FieldDef::optional("postal_code", FieldKind::Text),
    FieldDef::optional(
        "segment",
        FieldKind::Enum {
            allowed: ORGANIZATION_SEGMENTS,
            fallback: Some("OTHER"),
        },
    ),
    FieldDef::optional(
        "priority",
        FieldKind::Enum {
            allowed: ORGANIZATION_PRIORITIES,
            fallback: None,
        },
    ),
    FieldDef::optional("is_principal", FieldKind::Boolean),
    FieldDef::optional("is_distributor", FieldKind::Boolean),
    FieldDef::optional("notes", FieldKind::Text),
];

const ALIASES: &[(&str, &str)] = &[
    ("company", "name"),
    ("company_name", "name"),
    ("organization", "name"),
    ("organisation", "name"),
    ("organization_name", "name"),
    ("email_address", "email"),
    ("phone_number", "phone"),
    ("telephone", "phone"),
    ("url", "website"),
    ("web", "website"),
    ("street", "address"),
    ("zip", "postal_code"),
    ("zip_code", "postal_code"),
    ("postcode", "postal_code"),
    ("province", "state"),
    ("principal", "is_principal"),
    ("distributor", "is_distributor"),
];

pub struct OrganizationDescriptor;

impl EntityDescriptor for OrganizationDescriptor {
    fn kind(&self) -> EntityKind {
        EntityKind::Organization
    }

    fn fields(&self) -> &'static [FieldDef] {
        FIELDS
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        ALIASES
    }

    fn soft_deletes(&self) -> bool {
        true
    }

    /// Name OR email, both case-insensitive.
    fn natural_key(&self, record: &NormalizedRecord) -> Option<MatchQuery> {
        let clauses = ["name", "email"]
            .into_iter()
            .filter_map(|field| {
                record
                    .get(field)
                    .map(|value| MatchClause::case_insensitive(field, value.clone()))
            })
            .collect();
        MatchQuery::any(clauses)
    }
}
