pub mod export;
pub mod import;

use galley_core::entity::EntityKind;

use crate::error::AppError;

/// Parse the `{entity}` path segment (singular or plural).
fn entity_from_path(raw: &str) -> Result<EntityKind, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}
