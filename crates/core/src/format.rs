//! Format parser: raw payload bytes to [`RawRecord`]s.
//!
//! JSON payloads are either a bare array of objects or an object wrapping
//! the array under the entity's plural name (the export envelope has this
//! shape). CSV payloads carry a header row. Field names from either format
//! go through [`normalize_header`] and then the entity's alias table.
//!
//! CSV rows whose column count differs from the header are dropped and
//! counted in [`ParsedPayload::dropped_rows`] rather than failing the file.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::entity::{EntityDescriptor, EntityKind};
use crate::error::FormatError;
use crate::policy::ImportFormat;
use crate::record::{RawRecord, RawValue};

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-]+").expect("separator pattern is valid"));

/// Records extracted from one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPayload {
    pub records: Vec<RawRecord>,
    /// CSV rows discarded for not matching the header's column count.
    pub dropped_rows: usize,
}

/// Lower-case, trim, and turn runs of whitespace or hyphens into `_`.
pub fn normalize_header(header: &str) -> String {
    let trimmed = header.trim_start_matches('\u{feff}').trim().to_lowercase();
    SEPARATORS.replace_all(&trimmed, "_").into_owned()
}

/// Normalized header resolved through the entity's alias table.
pub fn canonical_header(descriptor: &dyn EntityDescriptor, header: &str) -> String {
    let normalized = normalize_header(header);
    descriptor.canonical_name(&normalized).to_string()
}

/// Parse `bytes` as `format` for the given entity family.
pub fn parse(bytes: &[u8], format: ImportFormat, kind: EntityKind) -> Result<ParsedPayload, FormatError> {
    match format {
        ImportFormat::Json => parse_json(bytes, kind),
        ImportFormat::Csv => parse_csv(bytes, kind),
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn parse_json(bytes: &[u8], kind: EntityKind) -> Result<ParsedPayload, FormatError> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|e| FormatError::InvalidJson(e.to_string()))?;

    let items = match root {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(kind.plural()) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(FormatError::UnexpectedStructure {
                    expected_key: kind.plural(),
                })
            }
        },
        _ => {
            return Err(FormatError::UnexpectedStructure {
                expected_key: kind.plural(),
            })
        }
    };

    let descriptor = kind.descriptor();
    let records = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(key, value)| (canonical_header(descriptor, &key), json_scalar(value)))
                .collect::<RawRecord>()),
            _ => Err(FormatError::NonObjectRecord { index }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedPayload {
        records,
        dropped_rows: 0,
    })
}

/// Flatten a JSON value into a raw scalar. Nested arrays and objects are
/// kept as compact JSON text (setting values use this).
fn json_scalar(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => RawValue::Integer(i),
            None => n.as_f64().map_or(RawValue::Text(n.to_string()), RawValue::Float),
        },
        Value::String(s) => RawValue::Text(s),
        nested @ (Value::Array(_) | Value::Object(_)) => RawValue::Text(nested.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn parse_csv(bytes: &[u8], kind: EntityKind) -> Result<ParsedPayload, FormatError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows = reader.records();

    let header_row = rows
        .next()
        .ok_or(FormatError::MissingHeader)?
        .map_err(csv_error)?;

    let descriptor = kind.descriptor();
    let headers: Vec<String> = header_row
        .iter()
        .map(|h| canonical_header(descriptor, h))
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(FormatError::MissingHeader);
    }

    let mut payload = ParsedPayload::default();
    for row in rows {
        let row = row.map_err(csv_error)?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        if row.len() != headers.len() {
            payload.dropped_rows += 1;
            continue;
        }
        let record = headers
            .iter()
            .zip(row.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.clone(), RawValue::from(value)))
            .collect::<RawRecord>();
        payload.records.push(record);
    }

    Ok(payload)
}

fn csv_error(err: csv::Error) -> FormatError {
    match err.kind() {
        csv::ErrorKind::Utf8 { .. } => FormatError::InvalidEncoding(err.to_string()),
        _ => FormatError::InvalidCsv(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
