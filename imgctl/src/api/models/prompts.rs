use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::firestore::PromptRecord;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PromptsResponse {
    pub success: bool,
    pub message: String,
    /// Newest first
    pub prompts: Vec<PromptRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PromptResponse {
    pub success: bool,
    pub prompt: PromptRecord,
}
