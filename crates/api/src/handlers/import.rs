//! Handler for file imports.
//!
//! The file is the raw request body. Run options come from the query
//! string and the acting user from the `x-actor` header.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use galley_core::error::FormatError;
use galley_core::policy::{ConflictResolution, DeletedStatePolicy, ImportFormat, ImportPolicy};
use galley_core::types::{Actor, DbId};
use galley_engine::{ImportError, ImportReport, ImportRequest, ImportStore};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Header naming the user the import runs on behalf of.
pub const ACTOR_HEADER: &str = "x-actor";

/// Query parameters for the import endpoint.
#[derive(Debug, Deserialize, Validate)]
pub struct ImportParams {
    /// `csv` or `json`. Falls back to `file_name`'s extension, then the
    /// request's `Content-Type`.
    pub format: Option<String>,
    pub file_name: Option<String>,
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    #[serde(default)]
    pub deleted_state_policy: DeletedStatePolicy,
    pub default_organization_id: Option<DbId>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl ImportParams {
    fn policy(&self) -> ImportPolicy {
        ImportPolicy {
            conflict_resolution: self.conflict_resolution,
            deleted_state_policy: self.deleted_state_policy,
            default_organization_id: self.default_organization_id,
            notes: self.notes.clone(),
        }
    }

    fn format(&self, headers: &HeaderMap) -> Result<ImportFormat, FormatError> {
        if let Some(format) = &self.format {
            return format.parse();
        }
        if let Some(name) = &self.file_name {
            return ImportFormat::from_file_name(name);
        }
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        format_from_content_type(content_type)
    }
}

fn format_from_content_type(content_type: &str) -> Result<ImportFormat, FormatError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "application/json" => Ok(ImportFormat::Json),
        "text/csv" | "text/plain" | "application/csv" => Ok(ImportFormat::Csv),
        "" => Err(FormatError::UnsupportedFormat("unspecified".into())),
        _ => Err(FormatError::UnsupportedFormat(mime)),
    }
}

/// The acting user: the `x-actor` header, or `default_actor` when absent.
pub(crate) fn actor(headers: &HeaderMap, default_actor: &str) -> Actor {
    let name = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_actor);
    Actor::named(name)
}

/// POST /api/v1/import/{entity}
///
/// Import the request body into `entity` and report what happened to each
/// record. Per-record failures are part of a successful response; only a
/// run that commits nothing returns an error status.
pub async fn import_records<S: ImportStore>(
    State(state): State<AppState<S>>,
    Path(entity): Path<String>,
    params: Result<Query<ImportParams>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> AppResult<Json<DataResponse<ImportReport>>> {
    let entity = super::entity_from_path(&entity)?;
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    params.validate()?;

    let body = body.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge {
            limit: state.config.import_max_bytes,
        },
        _ => AppError::BadRequest(e.body_text()),
    })?;
    let format = params.format(&headers).map_err(ImportError::from)?;

    let report = state
        .service
        .import(ImportRequest {
            bytes: &body,
            format,
            entity,
            policy: params.policy(),
            actor: actor(&headers, &state.config.default_actor),
        })
        .await?;

    Ok(Json(DataResponse { data: report }))
}
