use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use galley_engine::{ExportError, ImportError};

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent `{ "error", "code" }`
/// JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Export(#[from] ExportError),

    /// Query parameters failed validation.
    #[error("Invalid parameters: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// The request body exceeded the configured limit before it was read.
    #[error("File is too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: usize },

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- Import errors ---
            AppError::Import(ImportError::PayloadTooLarge { .. })
            | AppError::PayloadTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                self.to_string(),
            ),
            AppError::Import(ImportError::Format(err)) => {
                (StatusCode::BAD_REQUEST, "FORMAT_ERROR", err.to_string())
            }
            AppError::Import(ImportError::System(err)) => {
                tracing::error!(error = %err, "Import aborted");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IMPORT_FAILED",
                    "Import failed; no records were saved".to_string(),
                )
            }

            // --- Export errors ---
            AppError::Export(err) => {
                tracing::error!(error = %err, "Export failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }

            // --- HTTP-specific errors ---
            AppError::Validation(err) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
