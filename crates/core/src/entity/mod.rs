//! Entity families and their import capabilities.
//!
//! Every family the engine reconciles is described by an
//! [`EntityDescriptor`]: its canonical fields and their kinds, the header
//! alias table, foreign-key rules, soft-delete support, and the natural key
//! used to recognise an existing row. The parser, normalizer, matcher and
//! exporter are generic over this trait; nothing else in the pipeline
//! branches on the entity type.

mod contact;
mod interaction;
mod organization;
mod setting;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::matcher::MatchQuery;
use crate::record::NormalizedRecord;

pub use contact::ContactDescriptor;
pub use interaction::{InteractionDescriptor, INTERACTION_OUTCOMES, INTERACTION_TYPES};
pub use organization::{OrganizationDescriptor, ORGANIZATION_PRIORITIES, ORGANIZATION_SEGMENTS};
pub use setting::{SettingDescriptor, SETTING_CATEGORIES, SETTING_TYPES};

// ---------------------------------------------------------------------------
// Entity kind
// ---------------------------------------------------------------------------

/// The four reconcilable entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contact,
    Interaction,
    Organization,
    Setting,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        Self::Contact,
        Self::Interaction,
        Self::Organization,
        Self::Setting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Interaction => "interaction",
            Self::Organization => "organization",
            Self::Setting => "setting",
        }
    }

    /// Plural name, used as the JSON wrapper key and the table name.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Contact => "contacts",
            Self::Interaction => "interactions",
            Self::Organization => "organizations",
            Self::Setting => "settings",
        }
    }

    pub fn descriptor(&self) -> &'static dyn EntityDescriptor {
        match self {
            Self::Contact => &ContactDescriptor,
            Self::Interaction => &InteractionDescriptor,
            Self::Organization => &OrganizationDescriptor,
            Self::Setting => &SettingDescriptor,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    /// Accepts singular or plural names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower || k.plural() == lower)
            .ok_or_else(|| format!("Unknown entity type '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Field definitions
// ---------------------------------------------------------------------------

/// How a raw value is coerced into a canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Trimmed and lower-cased.
    Email,
    Integer,
    /// `true`, `1`, `yes`, `primary` (any case) are true; anything else false.
    Boolean,
    /// Parsed permissively; unparseable input becomes "now".
    Timestamp,
    /// Upper-cased member of a fixed set. Unknown values take `fallback`
    /// when there is one and fail the record otherwise.
    Enum {
        allowed: &'static [&'static str],
        fallback: Option<&'static str>,
    },
    /// Lower-cased member of a fixed allow-list; unknown values fail.
    AllowList(&'static [&'static str]),
    /// A foreign-key id, filled in by reference resolution.
    Reference(ReferenceKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Missing timestamps are filled with the clock's "now".
    pub default_now: bool,
}

impl FieldDef {
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default_now: false,
        }
    }

    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default_now: false,
        }
    }

    /// A timestamp that is always present after normalization.
    pub const fn timestamp_or_now(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Timestamp,
            required: false,
            default_now: true,
        }
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Entities that can be the target of a human-readable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Organization,
    Contact,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Contact => "contact",
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a named reference does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReference {
    /// Create the target on the fly from the label.
    Create,
    /// Fail the record with a validation error.
    Reject,
}

/// A foreign key expressed in the payload by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceDef {
    /// Canonical id field written on the record (e.g. `organization_id`).
    pub field: &'static str,
    /// Raw field carrying the label (e.g. `organization_name`); also the
    /// column name used on export.
    pub source: &'static str,
    pub target: ReferenceKind,
    pub on_missing: MissingReference,
    /// Fall back to the policy's default organization when no label is given.
    pub uses_default: bool,
}

// ---------------------------------------------------------------------------
// Descriptor trait
// ---------------------------------------------------------------------------

/// Import capabilities of one entity family.
pub trait EntityDescriptor: Send + Sync + 'static {
    fn kind(&self) -> EntityKind;

    /// Canonical fields in export column order.
    fn fields(&self) -> &'static [FieldDef];

    /// Normalized header → canonical (or reference source) name.
    fn aliases(&self) -> &'static [(&'static str, &'static str)];

    fn references(&self) -> &'static [ReferenceDef] {
        &[]
    }

    /// Whether rows are soft-deleted and matchable while deleted.
    fn soft_deletes(&self) -> bool {
        false
    }

    /// Natural-key lookup for `record`, or `None` when the record carries no
    /// usable key (it can then only be created).
    fn natural_key(&self, record: &NormalizedRecord) -> Option<MatchQuery>;

    /// Cross-field checks and rewrites after per-field coercion.
    fn refine(&self, _record: &mut NormalizedRecord) -> Result<(), ValidationError> {
        Ok(())
    }

    fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields().iter().find(|f| f.name == name)
    }

    fn reference_for_source(&self, source: &str) -> Option<&'static ReferenceDef> {
        self.references().iter().find(|r| r.source == source)
    }

    /// Resolve a normalized header through the alias table.
    fn canonical_name<'a>(&self, header: &'a str) -> &'a str {
        self.aliases()
            .iter()
            .find(|(alias, _)| *alias == header)
            .map_or(header, |&(_, canonical)| canonical)
    }

    /// Column names used on export: reference ids are replaced by their
    /// label source, and soft-deletable families gain `deleted_at`.
    fn export_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = self
            .fields()
            .iter()
            .map(|f| match f.kind {
                FieldKind::Reference(_) => self
                    .references()
                    .iter()
                    .find(|r| r.field == f.name)
                    .map_or(f.name, |r| r.source),
                _ => f.name,
            })
            .collect();
        if self.soft_deletes() {
            columns.push(DELETED_AT);
        }
        columns
    }
}

/// Raw and export column carrying the soft-delete marker.
pub const DELETED_AT: &str = "deleted_at";

/// Raw boolean columns that also mark a record deleted.
pub const DELETED_FLAGS: &[&str] = &["is_deleted", "deleted"];
