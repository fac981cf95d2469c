use serde::Serialize;
use utoipa::ToSchema;

use super::generation::GenerationStatus;
use crate::storage::StoredObject;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserImagesResponse {
    pub status: GenerationStatus,
    pub message: String,
    pub images: Vec<StoredObject>,
}
