//! Route definitions for the `/prompts` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::prompts;
use crate::state::AppState;

/// Routes mounted at `/prompts`.
///
/// ```text
/// POST   /                -> create_prompt
/// GET    /{id}            -> get_prompt
/// GET    /{id}/session    -> get_session
/// GET    /{id}/items      -> list_items
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(prompts::create_prompt))
        .route("/{id}", get(prompts::get_prompt))
        .route("/{id}/session", get(prompts::get_session))
        .route("/{id}/items", get(prompts::list_items))
}
