//! Export rendering: stored rows back to display strings and file bytes.
//!
//! The inverse of the parser and normalizer. Typed values become strings,
//! reference ids become labels under their source column, and soft-deleted
//! rows carry `deleted_at`. The output parses back into the same records.

use std::collections::HashMap;

use chrono::SecondsFormat;
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::entity::{EntityKind, FieldKind, ReferenceKind, DELETED_AT};
use crate::error::RenderError;
use crate::policy::ImportFormat;
use crate::record::{FieldMap, FieldValue};
use crate::types::{Actor, DbId, Timestamp};

/// Version number written into JSON export envelopes.
pub const EXPORT_VERSION: u32 = 1;

/// Which rows an export includes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilters {
    /// Rows belonging to this organization (the organization itself for
    /// organization exports). Ignored for settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<DbId>,
    /// Settings category. Ignored for other families.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    /// Inclusive lower bound on the row's date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Timestamp>,
    /// Inclusive upper bound on the row's date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Timestamp>,
}

impl ExportFilters {
    /// Whether `row` of family `kind` passes these filters. Stores that
    /// filter in their query language must agree with this.
    pub fn admits(&self, kind: EntityKind, row: &ExportRow) -> bool {
        if row.deleted_at.is_some() && !self.include_deleted {
            return false;
        }
        if let Some(org) = self.organization_id {
            let owner = match kind {
                EntityKind::Organization => Some(row.id),
                EntityKind::Contact | EntityKind::Interaction => {
                    row.fields.get("organization_id").and_then(FieldValue::as_reference)
                }
                EntityKind::Setting => Some(org),
            };
            if owner != Some(org) {
                return false;
            }
        }
        if let (EntityKind::Setting, Some(category)) = (kind, &self.category) {
            if row.fields.get("category").and_then(FieldValue::as_str) != Some(category.as_str()) {
                return false;
            }
        }
        self.admits_dates(kind, row)
    }

    fn admits_dates(&self, kind: EntityKind, row: &ExportRow) -> bool {
        let date = row.filter_date(kind);
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// The column a family's date filters apply to.
pub fn date_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Interaction => "interaction_date",
        _ => "created_at",
    }
}

/// One stored row as handed to the exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub id: DbId,
    pub fields: FieldMap,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl ExportRow {
    fn filter_date(&self, kind: EntityKind) -> Timestamp {
        match date_column(kind) {
            "created_at" => self.created_at,
            column => self
                .fields
                .get(column)
                .and_then(FieldValue::as_timestamp)
                .unwrap_or(self.created_at),
        }
    }
}

/// Reference id → display label, per target family.
pub type ReferenceLabels = HashMap<(ReferenceKind, DbId), String>;

/// Envelope metadata for one export.
#[derive(Debug, Clone)]
pub struct ExportMeta {
    pub exported_at: Timestamp,
    pub exported_by: Actor,
    pub filters: ExportFilters,
}

/// Display string for a typed value.
pub fn display_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) | FieldValue::Enum(s) => s.clone(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Timestamp(ts) => format_timestamp(*ts),
        FieldValue::Reference(id) => id.to_string(),
    }
}

pub fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A row as ordered export column → display string (`None` when unset).
pub fn denormalize(
    kind: EntityKind,
    row: &ExportRow,
    labels: &ReferenceLabels,
) -> IndexMap<&'static str, Option<String>> {
    let descriptor = kind.descriptor();
    let mut out = IndexMap::new();

    for def in descriptor.fields() {
        match def.kind {
            FieldKind::Reference(target) => {
                let source = descriptor
                    .references()
                    .iter()
                    .find(|r| r.field == def.name)
                    .map_or(def.name, |r| r.source);
                let label = row
                    .fields
                    .get(def.name)
                    .and_then(FieldValue::as_reference)
                    .and_then(|id| labels.get(&(target, id)).cloned());
                out.insert(source, label);
            }
            _ => {
                let value = row
                    .fields
                    .get(def.name)
                    .filter(|v| !v.is_empty())
                    .map(display_value);
                out.insert(def.name, value);
            }
        }
    }

    if descriptor.soft_deletes() {
        out.insert(DELETED_AT, row.deleted_at.map(format_timestamp));
    }
    out
}

/// Render rows in `format`.
pub fn render(
    kind: EntityKind,
    rows: &[ExportRow],
    labels: &ReferenceLabels,
    format: ImportFormat,
    meta: &ExportMeta,
) -> Result<Vec<u8>, RenderError> {
    let records: Vec<_> = rows.iter().map(|row| denormalize(kind, row, labels)).collect();
    match format {
        ImportFormat::Json => render_json(kind, &records, meta),
        ImportFormat::Csv => render_csv(kind, &records),
    }
}

/// Suggested download name, e.g. `contacts_20261018T120000Z.csv`.
pub fn file_name(kind: EntityKind, format: ImportFormat, exported_at: Timestamp) -> String {
    format!(
        "{}_{}.{}",
        kind.plural(),
        exported_at.format("%Y%m%dT%H%M%SZ"),
        format.as_str()
    )
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

struct Envelope<'a> {
    kind: EntityKind,
    meta: &'a ExportMeta,
    records: &'a [IndexMap<&'static str, Option<String>>],
}

impl Serialize for Envelope<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let plural = self.kind.plural();
        let mut map = serializer.serialize_map(Some(6))?;
        map.serialize_entry("version", &EXPORT_VERSION)?;
        map.serialize_entry("exported_at", &format_timestamp(self.meta.exported_at))?;
        map.serialize_entry("exported_by", &self.meta.exported_by.name)?;
        map.serialize_entry(&format!("total_{plural}"), &self.records.len())?;
        map.serialize_entry("filters", &self.meta.filters)?;
        map.serialize_entry(plural, self.records)?;
        map.end()
    }
}

fn render_json(
    kind: EntityKind,
    records: &[IndexMap<&'static str, Option<String>>],
    meta: &ExportMeta,
) -> Result<Vec<u8>, RenderError> {
    let envelope = Envelope {
        kind,
        meta,
        records,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn render_csv(
    kind: EntityKind,
    records: &[IndexMap<&'static str, Option<String>>],
) -> Result<Vec<u8>, RenderError> {
    let columns = kind.descriptor().export_columns();
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(&columns)
        .map_err(|e| RenderError::Csv(e.to_string()))?;
    for record in records {
        let row = columns
            .iter()
            .map(|c| record.get(c).cloned().flatten().unwrap_or_default());
        writer
            .write_record(row)
            .map_err(|e| RenderError::Csv(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| RenderError::Csv(e.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::format::parse;

    fn at(day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, day, 10, 30, 0).unwrap()
    }

    fn contact_row(id: DbId, org: Option<DbId>, deleted: bool) -> ExportRow {
        let mut fields = FieldMap::new();
        fields.insert("first_name", FieldValue::Text("Jane".into()));
        fields.insert("last_name", FieldValue::Text("Doe, Jr.".into()));
        fields.insert("email", FieldValue::Text(format!("jane{id}@acme.com")));
        fields.insert("is_primary", FieldValue::Bool(true));
        if let Some(org) = org {
            fields.insert("organization_id", FieldValue::Reference(org));
        }
        ExportRow {
            id,
            fields,
            created_at: at(id as u32),
            deleted_at: deleted.then(|| at(20)),
        }
    }

    fn labels() -> ReferenceLabels {
        HashMap::from([((ReferenceKind::Organization, 4), "Acme Inc".to_string())])
    }

    fn meta() -> ExportMeta {
        ExportMeta {
            exported_at: at(18),
            exported_by: Actor::named("ops"),
            filters: ExportFilters::default(),
        }
    }

    #[test]
    fn references_render_as_labels() {
        let out = denormalize(EntityKind::Contact, &contact_row(1, Some(4), false), &labels());
        assert_eq!(out["organization_name"].as_deref(), Some("Acme Inc"));
        assert!(!out.contains_key("organization_id"));
        assert_eq!(out["is_primary"].as_deref(), Some("true"));
        assert_eq!(out["deleted_at"], None);
    }

    #[test]
    fn timestamps_render_rfc3339_seconds() {
        assert_eq!(format_timestamp(at(4)), "2026-03-04T10:30:00Z");
    }

    #[test]
    fn json_envelope_shape() {
        let rows = [contact_row(1, Some(4), false), contact_row(2, None, false)];
        let bytes = render(EntityKind::Contact, &rows, &labels(), ImportFormat::Json, &meta()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["exported_by"], "ops");
        assert_eq!(json["exported_at"], "2026-03-18T10:30:00Z");
        assert_eq!(json["total_contacts"], 2);
        assert_eq!(json["contacts"][0]["organization_name"], "Acme Inc");
        assert!(json["contacts"][1]["organization_name"].is_null());
        assert_eq!(json["filters"]["include_deleted"], false);
    }

    #[test]
    fn csv_quotes_and_parses_back() {
        let rows = [contact_row(1, Some(4), false)];
        let bytes = render(EntityKind::Contact, &rows, &labels(), ImportFormat::Csv, &meta()).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("first_name,last_name,email,"));
        assert!(text.contains("\"Doe, Jr.\""));

        let parsed = parse(&bytes, ImportFormat::Csv, EntityKind::Contact).unwrap();
        assert_eq!(parsed.dropped_rows, 0);
        let record = &parsed.records[0];
        assert_eq!(record.text("last_name").as_deref(), Some("Doe, Jr."));
        assert_eq!(record.text("organization_name").as_deref(), Some("Acme Inc"));
    }

    #[test]
    fn json_export_parses_back_under_wrapper_key() {
        let rows = [contact_row(1, Some(4), false)];
        let bytes = render(EntityKind::Contact, &rows, &labels(), ImportFormat::Json, &meta()).unwrap();
        let parsed = parse(&bytes, ImportFormat::Json, EntityKind::Contact).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].text("email").as_deref(), Some("jane1@acme.com"));
    }

    #[test]
    fn filters_exclude_deleted_unless_asked() {
        let deleted = contact_row(1, None, true);
        assert!(!ExportFilters::default().admits(EntityKind::Contact, &deleted));

        let filters = ExportFilters {
            include_deleted: true,
            ..ExportFilters::default()
        };
        assert!(filters.admits(EntityKind::Contact, &deleted));
    }

    #[test]
    fn filters_by_organization_and_date() {
        let filters = ExportFilters {
            organization_id: Some(4),
            from: Some(at(2)),
            ..ExportFilters::default()
        };
        assert!(filters.admits(EntityKind::Contact, &contact_row(3, Some(4), false)));
        assert!(!filters.admits(EntityKind::Contact, &contact_row(3, Some(5), false)));
        assert!(!filters.admits(EntityKind::Contact, &contact_row(1, Some(4), false)));
    }

    #[test]
    fn file_name_includes_plural_and_timestamp() {
        assert_eq!(
            file_name(EntityKind::Setting, ImportFormat::Json, at(18)),
            "settings_20260318T103000Z.json"
        );
    }
}
