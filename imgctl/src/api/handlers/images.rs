use axum::{
    Json,
    extract::{Path, State},
};
use tracing::{error, instrument};

use crate::{
    AppState,
    api::models::{generation::GenerationStatus, images::UserImagesResponse},
    errors::{Error, Result},
};

#[utoipa::path(
    get,
    path = "/api/user_images/{user_uid}",
    tag = "images",
    summary = "List a user's stored images",
    params(
        ("user_uid" = String, Path, description = "User ID whose image folder is listed"),
    ),
    responses(
        (status = 200, description = "Images in the user's folder", body = UserImagesResponse),
        (status = 400, description = "Blank user ID"),
        (status = 500, description = "Storage is not available or the listing failed"),
    )
)]
#[instrument(skip(state))]
pub async fn list_user_images(State(state): State<AppState>, Path(user_uid): Path<String>) -> Result<Json<UserImagesResponse>> {
    let Some(store) = state.blob_store.as_ref() else {
        return Err(Error::Internal {
            operation: "fetch images: storage is not initialized".to_string(),
        });
    };

    let user_uid = user_uid.trim();
    if user_uid.is_empty() {
        return Err(Error::BadRequest {
            message: "User UID is required.".to_string(),
        });
    }

    let prefix = format!("{}/{}/", state.config.storage.user_images_prefix.trim_end_matches('/'), user_uid);
    let images = store.list(&prefix).await.map_err(|e| {
        error!(prefix, error = %e, "Failed to list user images");
        Error::Internal {
            operation: "fetch images".to_string(),
        }
    })?;

    let message = if images.is_empty() {
        format!("No images found for user {user_uid}.")
    } else {
        format!("Successfully fetched images for user {user_uid}.")
    };

    Ok(Json(UserImagesResponse {
        status: GenerationStatus::Success,
        message,
        images,
    }))
}

#[cfg(test)]
mod tests {
    use crate::AppState;
    use crate::test_utils::{FixedGenerator, MemoryBlobStore, create_test_config, create_test_server};
    use axum::http::StatusCode;
    use serde_json::Value;
    use std::sync::Arc;

    fn server_with(store: Option<Arc<MemoryBlobStore>>) -> axum_test::TestServer {
        let state = AppState::builder()
            .config(create_test_config())
            .generator(Arc::new(FixedGenerator::new(b"", "")))
            .maybe_blob_store(store.map(|s| s as _))
            .build();
        create_test_server(state)
    }

    #[tokio::test]
    async fn test_lists_only_the_users_folder() {
        let store = Arc::new(MemoryBlobStore::default());
        store.insert("user_images/u1/cat.png");
        store.insert("user_images/u1/dog.png");
        store.insert("user_images/u2/other.png");

        let response = server_with(Some(store)).get("/api/user_images/u1").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Successfully fetched images for user u1.");
        let images = body["images"].as_array().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0]["name"], "cat.png");
        assert_eq!(images[0]["full_path"], "user_images/u1/cat.png");
        assert_eq!(images[0]["url"], "https://storage.test/bucket/user_images/u1/cat.png");
    }

    #[tokio::test]
    async fn test_empty_folder() {
        let response = server_with(Some(Arc::new(MemoryBlobStore::default()))).get("/api/user_images/nobody").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["message"], "No images found for user nobody.");
        assert_eq!(body["images"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_without_storage() {
        let response = server_with(None).get("/api/user_images/u1").await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json::<Value>()["status"], "error");
    }

    #[tokio::test]
    async fn test_listing_failure() {
        let response = server_with(Some(Arc::new(MemoryBlobStore::failing()))).get("/api/user_images/u1").await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Failed to fetch images");
    }
}
