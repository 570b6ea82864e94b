pub mod export;
pub mod health;
pub mod import;

use axum::Router;
use galley_engine::ImportStore;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /import/{entity}                                 import a file (POST, raw body)
/// /export/{entity}                                 export rows as a file (GET)
/// ```
///
/// `{entity}` is one of `organizations`, `contacts`, `interactions`,
/// `settings` (singular forms accepted).
pub fn api_routes<S: ImportStore>() -> Router<AppState<S>> {
    Router::new()
        .nest("/import", import::router())
        .nest("/export", export::router())
}
