//! Mounted at `/import`.

use axum::routing::post;
use axum::Router;
use galley_engine::ImportStore;

use crate::handlers::import;
use crate::state::AppState;

/// ```text
/// POST   /{entity}        -> import_records
/// ```
pub fn router<S: ImportStore>() -> Router<AppState<S>> {
    Router::new().route("/{entity}", post(import::import_records::<S>))
}
