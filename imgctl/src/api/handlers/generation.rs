use axum::{Json, extract::State};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::{
    AppState,
    api::{
        extract::JsonBody,
        models::generation::{GenerateRequest, GenerationResponse, GenerationStatus},
    },
    errors::{Error, Result},
    gemini::GeneratedImage,
    storage::object_name,
};

const MISSING_PROMPT: &str = "Please provide a prompt for the image.";

/// Validate the prompt and run the generator.
async fn generate(state: &AppState, request: &GenerateRequest) -> Result<GeneratedImage> {
    let prompt = request
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::BadRequest {
            message: MISSING_PROMPT.to_string(),
        })?;

    Ok(state.generator.generate(prompt).await?)
}

#[utoipa::path(
    post,
    path = "/generate_and_upload",
    tag = "generation",
    summary = "Generate an image and store it",
    description = "Generates an image from the prompt and uploads it to the bucket. When storage is \
                   unavailable or the upload fails the image is returned inline instead.",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Image generated (stored, or inline with status partial_success when the upload failed)", body = GenerationResponse),
        (status = 400, description = "Wrong content type, invalid body, or missing prompt"),
        (status = 500, description = "The model did not produce an image", body = GenerationResponse),
    )
)]
#[instrument(skip_all)]
pub async fn generate_and_upload(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<GenerateRequest>,
) -> Result<Json<GenerationResponse>> {
    let image = generate(&state, &request).await?;

    let Some(store) = state.blob_store.as_ref() else {
        info!("Storage not available, returning image inline");
        return Ok(Json(GenerationResponse::inline(
            GenerationStatus::Success,
            "Image generated successfully! (storage not available)",
            &image,
        )));
    };

    let prompt = request.prompt.as_deref().unwrap_or_default().trim();
    let filename = object_name(prompt, request.filename.as_deref(), Utc::now());

    match store.upload(&image.bytes, &filename, &image.mime_type).await {
        Ok(stored) => Ok(Json(GenerationResponse::stored(
            "Image generated and uploaded successfully!",
            &image,
            stored,
        ))),
        Err(e) => {
            warn!(filename, error = %e, "Upload failed, returning image inline");
            Ok(Json(GenerationResponse::inline(
                GenerationStatus::PartialSuccess,
                format!("Image generated but upload failed: {e}"),
                &image,
            )))
        }
    }
}

#[utoipa::path(
    post,
    path = "/generate_image",
    tag = "generation",
    summary = "Generate an image",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Image generated", body = GenerationResponse),
        (status = 400, description = "Wrong content type, invalid body, or missing prompt"),
        (status = 500, description = "The model did not produce an image", body = GenerationResponse),
    )
)]
#[instrument(skip_all)]
pub async fn generate_image(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<GenerateRequest>,
) -> Result<Json<GenerationResponse>> {
    let image = generate(&state, &request).await?;

    Ok(Json(GenerationResponse::inline(
        GenerationStatus::Success,
        "Image generated successfully!",
        &image,
    )))
}
