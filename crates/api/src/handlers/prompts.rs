//! Handlers for submitting prompts and following their progress.
//!
//! A prompt is stored as a job with its session, then handed to the
//! orchestrator which runs the stage chain in the background. Clients
//! follow progress over `/ws/{id}` and fall back to `/{id}/session` after
//! a reconnect.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use pinrelay_core::error::CoreError;
use pinrelay_core::types::{JobId, SessionId};
use pinrelay_db::models::item::ItemView;
use pinrelay_db::models::job::{Job, JobView};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Prompt text, at most 2000 characters after trimming.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePromptRequest {
    #[validate(length(min = 1, max = 2000, message = "text must be 1 to 2000 characters"))]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedPrompt {
    pub id: JobId,
    pub session_id: SessionId,
}

// ---------------------------------------------------------------------------
// POST /prompts
// ---------------------------------------------------------------------------

/// Store a prompt and start its pipeline.
///
/// The text is trimmed before validation; nothing is persisted when it is
/// rejected.
pub async fn create_prompt(
    State(state): State<AppState>,
    Json(body): Json<CreatePromptRequest>,
) -> AppResult<impl IntoResponse> {
    let request = CreatePromptRequest {
        text: body.text.trim().to_string(),
    };
    request.validate()?;

    let created = state.orchestrator.create_job(&request.text).await?;
    state
        .orchestrator
        .submit(created.job_id, created.session_id, request.text);

    tracing::info!(job_id = %created.job_id, "Prompt submitted");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: CreatedPrompt {
                id: created.job_id,
                session_id: created.session_id,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /prompts/{id}
// ---------------------------------------------------------------------------

pub async fn get_prompt(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, id).await?;
    Ok(Json(DataResponse {
        data: JobView::from(job),
    }))
}

// ---------------------------------------------------------------------------
// GET /prompts/{id}/session
// ---------------------------------------------------------------------------

/// Current stage, status and log of the prompt's session.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let session = state.orchestrator.context().tracker.get(id).await?;
    Ok(Json(DataResponse { data: session }))
}

// ---------------------------------------------------------------------------
// GET /prompts/{id}/items
// ---------------------------------------------------------------------------

/// Scraped items with their verdicts, in collection order.
pub async fn list_items(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state, id).await?;
    let items = state.orchestrator.context().items.items_for_job(id).await?;

    tracing::debug!(job_id = %id, count = items.len(), "Listed items");

    let data: Vec<ItemView> = items.into_iter().map(ItemView::from).collect();
    Ok(Json(DataResponse { data }))
}

/// Load a job or fail with 404.
pub(crate) async fn find_job(state: &AppState, id: JobId) -> AppResult<Job> {
    state
        .orchestrator
        .context()
        .jobs
        .get_job(id)
        .await?
        .ok_or_else(|| {
            CoreError::NotFound {
                entity: "prompt",
                id: id.to_string(),
            }
            .into()
        })
}
