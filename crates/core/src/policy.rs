//! Import run configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::types::DbId;

/// What to do when an incoming record matches a live existing row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Leave the existing row untouched.
    #[default]
    Skip,
    /// Write every incoming field over the existing row.
    Overwrite,
    /// Only fill fields that are currently empty on the existing row.
    Merge,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Merge => "merge",
        }
    }
}

/// What to do when an incoming record matches a soft-deleted row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedStatePolicy {
    /// Leave deleted rows alone.
    #[default]
    Ignore,
    /// Bring deleted rows back when the incoming record is live.
    Restore,
    /// Keep deleted rows deleted; records marked deleted are still applied.
    KeepDeleted,
}

impl DeletedStatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Restore => "restore",
            Self::KeepDeleted => "keep_deleted",
        }
    }
}

/// Configuration for one import run. Read-only once the run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPolicy {
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    #[serde(default)]
    pub deleted_state_policy: DeletedStatePolicy,
    /// Organization used when a record names none.
    #[serde(default)]
    pub default_organization_id: Option<DbId>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ImportPolicy {
    pub fn with_conflict_resolution(conflict_resolution: ConflictResolution) -> Self {
        Self {
            conflict_resolution,
            ..Self::default()
        }
    }
}

/// Supported payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportFormat {
    Json,
    Csv,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
        }
    }

    /// Derive the format from a file name's extension.
    pub fn from_file_name(name: &str) -> Result<Self, FormatError> {
        let extension = name.rsplit_once('.').map_or("", |(_, ext)| ext);
        extension.parse()
    }
}

impl std::fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" | "txt" => Ok(Self::Csv),
            other => Err(FormatError::UnsupportedFormat(other.to_string())),
        }
    }
}
