/// The payload cannot be turned into records at all.
///
/// Always fatal to the whole run and raised before any transaction opens.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unexpected structure: expected an array or an object with a \"{expected_key}\" array")]
    UnexpectedStructure { expected_key: &'static str },

    #[error("Record {index} is not a JSON object")]
    NonObjectRecord { index: usize },

    #[error("CSV file has no header row")]
    MissingHeader,

    #[error("Invalid CSV: {0}")]
    InvalidCsv(String),
}

/// A single record failed normalization.
///
/// Never escapes the batch controller: it becomes an entry in the outcome's
/// error list and the run continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Invalid value '{value}' for field '{field}': {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("No {kind} named '{label}' exists")]
    UnresolvedReference { kind: &'static str, label: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// The canonical field the error refers to, when there is one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { field } | Self::InvalidValue { field, .. } => Some(field),
            Self::UnresolvedReference { .. } => None,
        }
    }
}

/// An export could not be serialized.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to write CSV: {0}")]
    Csv(String),

    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}
