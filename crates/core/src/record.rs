//! Record shapes flowing through the import pipeline.
//!
//! A [`RawRecord`] is what the format parser extracted, keyed by the
//! (aliased) source field name. A [`NormalizedRecord`] is keyed by canonical
//! field name and holds typed [`FieldValue`]s. Empty values never make it
//! into a normalized record; merge semantics rely on "absent" being the only
//! spelling of "unset".

use std::borrow::Cow;
use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;

use crate::entity::ReferenceDef;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Raw records
// ---------------------------------------------------------------------------

/// A scalar as it appeared in the source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Textual form, trimmed. `None` for nulls and blank strings.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(Cow::Owned(b.to_string())),
            Self::Integer(i) => Some(Cow::Owned(i.to_string())),
            Self::Float(f) => Some(Cow::Owned(f.to_string())),
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Cow::Borrowed(trimmed))
                }
            }
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One row (CSV) or one array element (JSON), in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawRecord {
    fields: IndexMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value. A later duplicate key only wins over a blank value.
    pub fn insert(&mut self, key: impl Into<String>, value: RawValue) {
        let key = key.into();
        match self.fields.get(&key) {
            Some(existing) if existing.as_text().is_some() && value.as_text().is_none() => {}
            _ => {
                self.fields.insert(key, value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields.get(key)
    }

    /// Trimmed, non-blank text for `key`.
    pub fn text(&self, key: &str) -> Option<Cow<'_, str>> {
        self.fields.get(key).and_then(RawValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawValue)> {
        self.fields.iter()
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = RawRecord::new();
        for (k, v) in iter {
            record.insert(k, v.into());
        }
        record
    }
}

// ---------------------------------------------------------------------------
// Typed values
// ---------------------------------------------------------------------------

/// A typed canonical value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    Timestamp(Timestamp),
    /// Upper-cased member of the field's fixed set.
    Enum(String),
    /// A resolved foreign-key id.
    Reference(DbId),
}

impl FieldValue {
    /// `true` for blank text. Storage may hold empty strings even though the
    /// normalizer never produces them.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) | Self::Enum(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<DbId> {
        match self {
            Self::Reference(id) => Some(*id),
            _ => None,
        }
    }
}

/// Canonical field name to value. Names always come from an entity
/// descriptor, so they are `'static`.
pub type FieldMap = BTreeMap<&'static str, FieldValue>;

/// Something the normalizer substituted rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationNote {
    /// An unparseable date was replaced by the clock's "now".
    DateFallback { field: &'static str, value: String },
    /// An unrecognized enum value was replaced by the field's default.
    EnumFallback {
        field: &'static str,
        value: String,
        fallback: &'static str,
    },
}

/// A foreign-key reference still expressed as a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReference {
    pub def: &'static ReferenceDef,
    /// `None` when the record named no target.
    pub label: Option<String>,
}

/// A record after coercion, keyed by canonical field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    pub fields: FieldMap,
    pub references: Vec<PendingReference>,
    /// The source marked this record as deleted.
    pub marked_deleted: bool,
    pub notes: Vec<NormalizationNote>,
}

impl NormalizedRecord {
    /// Set a field, dropping empty values.
    pub fn set(&mut self, field: &'static str, value: FieldValue) {
        if value.is_empty() {
            self.fields.remove(field);
        } else {
            self.fields.insert(field, value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(FieldValue::as_str)
    }

    pub fn reference(&self, field: &str) -> Option<DbId> {
        self.fields.get(field).and_then(FieldValue::as_reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_text_is_trimmed_and_blank_is_none() {
        assert_eq!(RawValue::from("  Acme ").as_text().as_deref(), Some("Acme"));
        assert!(RawValue::from("   ").as_text().is_none());
        assert!(RawValue::Null.as_text().is_none());
        assert_eq!(RawValue::Integer(7).as_text().as_deref(), Some("7"));
    }

    #[test]
    fn duplicate_blank_key_does_not_clobber_value() {
        let mut record = RawRecord::new();
        record.insert("name", RawValue::from("Acme"));
        record.insert("name", RawValue::from(""));
        assert_eq!(record.text("name").as_deref(), Some("Acme"));

        record.insert("name", RawValue::from("Beta"));
        assert_eq!(record.text("name").as_deref(), Some("Beta"));
    }

    #[test]
    fn set_omits_empty_values() {
        let mut record = NormalizedRecord::default();
        record.set("name", FieldValue::Text("  ".into()));
        assert!(record.get("name").is_none());

        record.set("name", FieldValue::Text("Acme".into()));
        record.set("name", FieldValue::Text(String::new()));
        assert!(record.get("name").is_none(), "blank overwrite removes the field");
    }
}
