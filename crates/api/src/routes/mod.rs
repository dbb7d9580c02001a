pub mod health;
pub mod injectables;
pub mod render;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /injectables                 GET   catalog for the caller's scope
/// /render/{version_id}         POST  render a template version to PDF
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/injectables", get(injectables::list))
        .route("/render/{version_id}", post(render::render))
}
