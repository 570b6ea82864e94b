//! Mounted at `/export`.

use axum::routing::get;
use axum::Router;
use galley_engine::ImportStore;

use crate::handlers::export;
use crate::state::AppState;

/// ```text
/// GET    /{entity}        -> export_records
/// ```
pub fn router<S: ImportStore>() -> Router<AppState<S>> {
    Router::new().route("/{entity}", get(export::export_records::<S>))
}
