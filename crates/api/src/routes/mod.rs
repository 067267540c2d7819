pub mod health;
pub mod prompts;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /prompts   prompt submission and lookup
/// /ws/{id}   progress stream for one prompt
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/prompts", prompts::router())
        .route("/ws/{id}", get(ws::ws_handler))
}
