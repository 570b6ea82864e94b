//! Contacts: people at an organization.

use crate::entity::{
    EntityDescriptor, EntityKind, FieldDef, FieldKind, MissingReference, ReferenceDef,
    ReferenceKind,
};
use crate::matcher::{MatchClause, MatchQuery};
use crate::record::{FieldValue, NormalizedRecord};

const FIELDS: &[FieldDef] = &[
    FieldDef::required("first_name", FieldKind::Text),
    FieldDef::required("last_name", FieldKind::Text),
    FieldDef::optional("email", FieldKind::Email),
    FieldDef::optional("phone", FieldKind::Text),
    FieldDef::optional("mobile", FieldKind::Text),
    FieldDef::optional("title", FieldKind::Text),
    FieldDef::optional("department", FieldKind::Text),
    FieldDef::optional(
        "organization_id",
        FieldKind::Reference(ReferenceKind::Organization),
    ),
    FieldDef::optional("is_primary", FieldKind::Boolean),
    FieldDef::optional("notes", FieldKind::Text),
];

const REFERENCES: &[ReferenceDef] = &[ReferenceDef {
    field: "organization_id",
    source: "organization_name",
    target: ReferenceKind::Organization,
    on_missing: MissingReference::Create,
    uses_default: true,
}];

const ALIASES: &[(&str, &str)] = &[
    ("firstname", "first_name"),
    ("first", "first_name"),
    ("given_name", "first_name"),
    ("lastname", "last_name"),
    ("last", "last_name"),
    ("surname", "last_name"),
    ("family_name", "last_name"),
    ("company", "organization_name"),
    ("company_name", "organization_name"),
    ("organization", "organization_name"),
    ("organisation", "organization_name"),
    ("email_address", "email"),
    ("e_mail", "email"),
    ("phone_number", "phone"),
    ("telephone", "phone"),
    ("mobile_phone", "mobile"),
    ("cell", "mobile"),
    ("job_title", "title"),
    ("position", "title"),
    ("primary", "is_primary"),
    ("primary_contact", "is_primary"),
];

pub struct ContactDescriptor;

impl EntityDescriptor for ContactDescriptor {
    fn kind(&self) -> EntityKind {
        EntityKind::Contact
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

    fn soft_deletes(&self) -> bool {
        true
    }

    /// Email when present; otherwise first + last name within the
    /// organization, when the organization is known.
    fn natural_key(&self, record: &NormalizedRecord) -> Option<MatchQuery> {
        if let Some(email) = record.get("email") {
            return MatchQuery::all(vec![MatchClause::case_insensitive("email", email.clone())]);
        }

        let organization_id = record.reference("organization_id")?;
        let first = record.get("first_name")?;
        let last = record.get("last_name")?;
        MatchQuery::all(vec![
            MatchClause::case_insensitive("first_name", first.clone()),
            MatchClause::case_insensitive("last_name", last.clone()),
            MatchClause::exact("organization_id", FieldValue::Reference(organization_id)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(email: Option<&str>, organization_id: Option<i64>) -> NormalizedRecord {
        let mut record = NormalizedRecord::default();
        record.set("first_name", FieldValue::Text("Jane".into()));
        record.set("last_name", FieldValue::Text("Doe".into()));
        if let Some(email) = email {
            record.set("email", FieldValue::Text(email.into()));
        }
        if let Some(id) = organization_id {
            record.set("organization_id", FieldValue::Reference(id));
        }
        record
    }

    #[test]
    fn email_wins_over_name() {
        let query = ContactDescriptor
            .natural_key(&contact(Some("jane@acme.com"), Some(3)))
            .unwrap();
        assert_eq!(query.clauses.len(), 1);
        assert_eq!(query.clauses[0].field, "email");
    }

    #[test]
    fn name_and_organization_without_email() {
        let query = ContactDescriptor.natural_key(&contact(None, Some(3))).unwrap();
        let fields: Vec<_> = query.clauses.iter().map(|c| c.field).collect();
        assert_eq!(fields, ["first_name", "last_name", "organization_id"]);
    }

    #[test]
    fn no_key_without_email_or_organization() {
        assert!(ContactDescriptor.natural_key(&contact(None, None)).is_none());
    }
}
