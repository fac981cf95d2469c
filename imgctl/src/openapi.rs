//! OpenAPI document for the HTTP API.

use utoipa::OpenApi;

use crate::api::{self, models};
use crate::firestore::PromptRecord;
use crate::storage::StoredObject;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "imgctl",
        description = "Generate images from text prompts, store them, and browse saved prompts."
    ),
    paths(
        api::handlers::generation::generate_and_upload,
        api::handlers::generation::generate_image,
        api::handlers::prompts::get_saved_prompts,
        api::handlers::prompts::get_prompt,
        api::handlers::images::list_user_images,
    ),
    components(schemas(
        models::generation::GenerateRequest,
        models::generation::GenerationResponse,
        models::generation::GenerationStatus,
        models::prompts::PromptsResponse,
        models::prompts::PromptResponse,
        models::images::UserImagesResponse,
        PromptRecord,
        StoredObject,
    )),
    tags(
        (name = "generation", description = "Image generation"),
        (name = "prompts", description = "Saved prompt records"),
        (name = "images", description = "Stored images"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();

        for expected in [
            "/generate_and_upload",
            "/generate_image",
            "/get_saved_prompts",
            "/get_prompt/{id}",
            "/api/user_images/{user_uid}",
        ] {
            assert!(paths.iter().any(|p| p == expected), "missing {expected} in {paths:?}");
        }
    }
}
