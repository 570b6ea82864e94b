//! Handler for file exports.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;

use galley_core::export::ExportFilters;
use galley_core::policy::ImportFormat;
use galley_core::types::{DbId, Timestamp};
use galley_engine::{ImportError, ImportStore};

use super::import::actor;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Query parameters for the export endpoint.
#[derive(Debug, Deserialize)]
pub struct ExportParams {
    /// `csv` (default) or `json`.
    pub format: Option<String>,
    pub organization_id: Option<DbId>,
    pub category: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    /// RFC 3339, inclusive.
    pub from: Option<Timestamp>,
    /// RFC 3339, inclusive.
    pub to: Option<Timestamp>,
}

impl ExportParams {
    fn filters(&self) -> ExportFilters {
        ExportFilters {
            organization_id: self.organization_id,
            category: self.category.clone(),
            include_deleted: self.include_deleted,
            from: self.from,
            to: self.to,
        }
    }
}

/// GET /api/v1/export/{entity}
///
/// Stream the matching rows back as a downloadable file.
pub async fn export_records<S: ImportStore>(
    State(state): State<AppState<S>>,
    Path(entity): Path<String>,
    params: Result<Query<ExportParams>, QueryRejection>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let entity = super::entity_from_path(&entity)?;
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let format = match &params.format {
        Some(raw) => raw.parse().map_err(ImportError::from)?,
        None => ImportFormat::Csv,
    };
    let actor = actor(&headers, &state.config.default_actor);

    let file = state
        .service
        .export(entity, format, params.filters(), &actor)
        .await?;

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, file.content_type.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.file_name),
            ),
        ],
        file.bytes,
    ))
}
