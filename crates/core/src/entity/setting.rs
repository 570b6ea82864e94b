//! Application settings stored as typed key/value pairs.

use crate::entity::{EntityDescriptor, EntityKind, FieldDef, FieldKind};
use crate::error::ValidationError;
use crate::matcher::{MatchClause, MatchQuery};
use crate::normalize::parse_bool;
use crate::record::{FieldValue, NormalizedRecord};

pub const SETTING_CATEGORIES: &[&str] = &[
    "general",
    "system",
    "ui",
    "notifications",
    "email",
    "sales",
    "import_export",
    "integrations",
    "security",
];

pub const SETTING_TYPES: &[&str] = &["string", "integer", "float", "boolean", "json", "array"];

const FIELDS: &[FieldDef] = &[
    FieldDef::required("key", FieldKind::Text),
    FieldDef::optional("value", FieldKind::Text),
    FieldDef::required("category", FieldKind::AllowList(SETTING_CATEGORIES)),
    FieldDef::required("setting_type", FieldKind::AllowList(SETTING_TYPES)),
    FieldDef::optional("description", FieldKind::Text),
    FieldDef::optional("is_public", FieldKind::Boolean),
];

const ALIASES: &[(&str, &str)] = &[
    ("type", "setting_type"),
    ("data_type", "setting_type"),
    ("group", "category"),
    ("name", "key"),
    ("setting", "key"),
    ("public", "is_public"),
];

pub struct SettingDescriptor;

impl EntityDescriptor for SettingDescriptor {
    fn kind(&self) -> EntityKind {
        EntityKind::Setting
    }

    fn fields(&self) -> &'static [FieldDef] {
        FIELDS
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        ALIASES
    }

    fn natural_key(&self, record: &NormalizedRecord) -> Option<MatchQuery> {
        let key = record.get("key")?;
        MatchQuery::all(vec![MatchClause::case_insensitive("key", key.clone())])
    }

    /// Check `value` against the declared `setting_type` and store it in
    /// canonical textual form.
    fn refine(&self, record: &mut NormalizedRecord) -> Result<(), ValidationError> {
        let (Some(setting_type), Some(value)) = (record.text("setting_type"), record.text("value"))
        else {
            return Ok(());
        };

        let canonical = match setting_type {
            "integer" => value
                .parse::<i64>()
                .map(|v| v.to_string())
                .map_err(|_| ValidationError::invalid("value", value, "expected an integer"))?,
            "float" => value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.to_string())
                .ok_or_else(|| ValidationError::invalid("value", value, "expected a number"))?,
            "boolean" => parse_bool(value).to_string(),
            "json" => serde_json::from_str::<serde_json::Value>(value)
                .map(|v| v.to_string())
                .map_err(|e| ValidationError::invalid("value", value, format!("invalid JSON: {e}")))?,
            "array" => match serde_json::from_str::<serde_json::Value>(value) {
                Ok(v @ serde_json::Value::Array(_)) => v.to_string(),
                _ => return Err(ValidationError::invalid("value", value, "expected a JSON array")),
            },
            _ => return Ok(()),
        };

        record.set("value", FieldValue::Text(canonical));
        Ok(())
    }
}
