//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no router needed.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;

use galley_api::error::AppError;
use galley_core::error::FormatError;
use galley_engine::{ExportError, ImportError, StoreError};

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn format_error_returns_400_with_reason() {
    let err = AppError::Import(ImportError::Format(FormatError::MissingHeader));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "FORMAT_ERROR");
    assert_eq!(json["error"], "CSV file has no header row");
}

#[tokio::test]
async fn payload_too_large_returns_413() {
    let err = AppError::Import(ImportError::PayloadTooLarge {
        size: 20,
        limit: 10,
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(json["error"], "File is too large (20 bytes, limit 10)");
}

#[tokio::test]
async fn systemic_import_failure_hides_store_details() {
    let err = AppError::Import(ImportError::System(StoreError::Unavailable(
        "connection to 10.0.0.5 refused".into(),
    )));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "IMPORT_FAILED");
    assert!(!json["error"].as_str().unwrap().contains("10.0.0.5"));
}

#[tokio::test]
async fn export_failure_returns_sanitized_500() {
    let err = AppError::Export(ExportError::Store(StoreError::Internal("boom".into())));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn bad_request_passes_message_through() {
    let err = AppError::BadRequest("Unknown entity type 'widgets'".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "Unknown entity type 'widgets'");
}
