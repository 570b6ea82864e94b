//! Field normalizer: raw records to typed, canonical records.
//!
//! Coercion is driven entirely by the entity descriptor's field kinds.
//! Foreign-key labels are carried through as [`PendingReference`]s; turning
//! them into ids needs storage and happens in the engine.
//!
//! Two substitutions are deliberate and recorded as notes instead of
//! failing the record: unparseable dates become "now", and unknown values of
//! enums with a fallback take the fallback.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::clock::Clock;
use crate::entity::{EntityKind, FieldDef, FieldKind, DELETED_AT, DELETED_FLAGS};
use crate::error::ValidationError;
use crate::record::{FieldValue, NormalizationNote, NormalizedRecord, PendingReference, RawRecord};
use crate::types::Timestamp;

/// Words accepted as boolean true (case-insensitive).
pub const TRUE_WORDS: &[&str] = &["true", "1", "yes", "primary"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

/// `true` for `true`, `1`, `yes`, `primary` in any case; `false` otherwise.
pub fn parse_bool(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    TRUE_WORDS.contains(&lower.as_str())
}

/// Parse a timestamp permissively. Naive values are taken as UTC; bare
/// dates are midnight UTC; nine or more digits are Unix seconds.
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    if value.len() >= 9 && value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    }
    None
}

/// Normalize one raw record for `kind`.
pub fn normalize(
    raw: &RawRecord,
    kind: EntityKind,
    clock: &dyn Clock,
) -> Result<NormalizedRecord, ValidationError> {
    let descriptor = kind.descriptor();
    let mut record = NormalizedRecord::default();

    for def in descriptor.fields() {
        if matches!(def.kind, FieldKind::Reference(_)) {
            continue;
        }
        match raw.text(def.name) {
            Some(value) => coerce_field(def, &value, clock, &mut record)?,
            None if def.default_now => record.set(def.name, FieldValue::Timestamp(clock.now())),
            None => {}
        }
        if def.required && record.get(def.name).is_none() {
            return Err(ValidationError::MissingField { field: def.name });
        }
    }

    record.references = descriptor
        .references()
        .iter()
        .map(|def| PendingReference {
            def,
            label: raw.text(def.source).map(|s| s.into_owned()),
        })
        .collect();

    record.marked_deleted = descriptor.soft_deletes() && is_marked_deleted(raw);

    descriptor.refine(&mut record)?;
    Ok(record)
}

fn coerce_field(
    def: &'static FieldDef,
    value: &str,
    clock: &dyn Clock,
    record: &mut NormalizedRecord,
) -> Result<(), ValidationError> {
    let coerced = match def.kind {
        FieldKind::Text => FieldValue::Text(value.to_string()),
        FieldKind::Email => FieldValue::Text(normalize_email(def.name, value)?),
        FieldKind::Integer => FieldValue::Integer(parse_integer(def.name, value)?),
        FieldKind::Boolean => FieldValue::Bool(parse_bool(value)),
        FieldKind::Timestamp => match parse_timestamp(value) {
            Some(ts) => FieldValue::Timestamp(ts),
            None => {
                record.notes.push(NormalizationNote::DateFallback {
                    field: def.name,
                    value: value.to_string(),
                });
                FieldValue::Timestamp(clock.now())
            }
        },
        FieldKind::Enum { allowed, fallback } => {
            let upper = enum_token(value);
            if allowed.contains(&upper.as_str()) {
                FieldValue::Enum(upper)
            } else if let Some(fallback) = fallback {
                record.notes.push(NormalizationNote::EnumFallback {
                    field: def.name,
                    value: value.to_string(),
                    fallback,
                });
                FieldValue::Enum(fallback.to_string())
            } else {
                return Err(ValidationError::invalid(
                    def.name,
                    value,
                    format!("expected one of {}", allowed.join(", ")),
                ));
            }
        }
        FieldKind::AllowList(allowed) => {
            let lower = value.to_lowercase();
            if !allowed.contains(&lower.as_str()) {
                return Err(ValidationError::invalid(
                    def.name,
                    value,
                    format!("expected one of {}", allowed.join(", ")),
                ));
            }
            FieldValue::Text(lower)
        }
        FieldKind::Reference(_) => return Ok(()),
    };
    record.set(def.name, coerced);
    Ok(())
}

fn normalize_email(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let email = value.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !email.contains(' ') => {
            Ok(email)
        }
        _ => Err(ValidationError::invalid(field, value, "not an email address")),
    }
}

/// Integers, tolerating a zero fractional part (`"30.0"`) as spreadsheets
/// tend to produce.
fn parse_integer(field: &'static str, value: &str) -> Result<i64, ValidationError> {
    let cleaned = value.replace(',', "");
    if let Ok(i) = cleaned.parse::<i64>() {
        return Ok(i);
    }
    match cleaned.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(ValidationError::invalid(field, value, "expected a whole number")),
    }
}

/// Upper-case and join words with `_` (`"follow up"` → `FOLLOW_UP`).
fn enum_token(value: &str) -> String {
    value
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

fn is_marked_deleted(raw: &RawRecord) -> bool {
    raw.text(DELETED_AT).is_some()
        || DELETED_FLAGS
            .iter()
            .any(|flag| raw.text(flag).is_some_and(|v| parse_bool(&v)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
