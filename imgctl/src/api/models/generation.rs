use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::gemini::GeneratedImage;
use crate::storage::StoredImageRef;

/// Body of the generation endpoints.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// Text description of the image
    #[serde(default)]
    pub prompt: Option<String>,
    /// Base name for the stored object; derived from the prompt when absent
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Success,
    /// The image was generated but could not be stored
    PartialSuccess,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationResponse {
    pub status: GenerationStatus,
    pub message: String,
    /// Public URL of the stored image
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Base64 encoded image bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    /// Text the model returned alongside the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_response: Option<String>,
}

impl GenerationResponse {
    /// An inline response carrying the image itself.
    pub fn inline(status: GenerationStatus, message: impl Into<String>, image: &GeneratedImage) -> Self {
        Self {
            status,
            message: message.into(),
            image_url: None,
            image_data: Some(BASE64.encode(&image.bytes)),
            text_response: Some(image.text.clone()),
        }
    }

    pub fn stored(message: impl Into<String>, image: &GeneratedImage, stored: StoredImageRef) -> Self {
        Self {
            image_url: Some(stored.public_url),
            ..Self::inline(GenerationStatus::Success, message, image)
        }
    }
}
