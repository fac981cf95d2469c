use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    AppState,
    api::models::prompts::{PromptResponse, PromptsResponse},
    errors::{Error, RecordsError},
    firestore::PromptStore,
};

fn prompt_store(state: &AppState) -> Result<&Arc<dyn PromptStore>, Error> {
    state.prompt_store.as_ref().ok_or_else(|| Error::Unavailable {
        service: "Prompt database".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/get_saved_prompts",
    tag = "prompts",
    summary = "List saved prompts",
    responses(
        (status = 200, description = "All saved prompts, newest first", body = PromptsResponse),
        (status = 500, description = "The database query failed"),
        (status = 503, description = "The prompt database is not available"),
    )
)]
#[instrument(skip_all)]
pub async fn get_saved_prompts(State(state): State<AppState>) -> Result<Json<PromptsResponse>, RecordsError> {
    let store = prompt_store(&state).map_err(RecordsError::listing)?;
    let prompts = store.list_all().await.map_err(RecordsError::listing)?;

    let message = if prompts.is_empty() {
        "No saved prompts found".to_string()
    } else {
        format!("Retrieved {} prompts", prompts.len())
    };

    Ok(Json(PromptsResponse {
        success: true,
        message,
        prompts,
    }))
}

#[utoipa::path(
    get,
    path = "/get_prompt/{id}",
    tag = "prompts",
    summary = "Get a saved prompt",
    params(
        ("id" = String, Path, description = "Prompt record ID"),
    ),
    responses(
        (status = 200, description = "The prompt record", body = PromptResponse),
        (status = 400, description = "Blank ID"),
        (status = 404, description = "No record with this ID"),
        (status = 500, description = "The database query failed"),
        (status = 503, description = "The prompt database is not available"),
    )
)]
#[instrument(skip(state))]
pub async fn get_prompt(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<PromptResponse>, RecordsError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(Error::BadRequest {
            message: "Prompt ID is required.".to_string(),
        }
        .into());
    }

    let store = prompt_store(&state)?;
    let prompt = store.get_by_id(id).await.map_err(Error::from)?.ok_or_else(|| Error::NotFound {
        resource: "Prompt".to_string(),
        id: id.to_string(),
    })?;

    Ok(Json(PromptResponse { success: true, prompt }))
}
