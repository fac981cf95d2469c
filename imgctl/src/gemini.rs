//! Image generation through the Gemini `generateContent` API.
//!
//! A single request asks for both text and image output. The first candidate's parts are folded
//! into a [`GeneratedImage`]: text parts are concatenated, the last inline image part wins. Every
//! failure, including a missing API key or a response without an image, comes back as a
//! [`GenerationError`] whose message is suitable to show to the caller.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::GeminiConfig;
use crate::http::with_segments;

/// Finish reasons that indicate the output was withheld by a content filter.
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "IMAGE_SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

/// A successfully generated image plus whatever text the model returned alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, ThisError)]
pub enum GenerationError {
    #[error("Error: Image prompt is empty.")]
    EmptyPrompt,

    #[error("Error: GEMINI_API_KEY not set.")]
    MissingApiKey,

    #[error("Image generation failed or returned no image.{}{}", blocked_note(.blocked), text_note(.text))]
    NoImage { blocked: bool, text: String },

    #[error("Error during image generation: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Error during image generation: API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Error during image generation: {0}")]
    InvalidResponse(String),
}

fn blocked_note(blocked: &bool) -> &'static str {
    if *blocked { " (Reason: May have been blocked by safety filters)" } else { "" }
}

fn text_note(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!(" Text response: {text}")
    }
}

/// Turns a prompt into an image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError>;
}

// --- Gemini API request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: RequestGenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct SafetyRating {
    #[serde(default)]
    blocked: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Best-effort check for content filtering. Not every API version reports it the same way.
    fn looks_blocked(&self) -> bool {
        let prompt_blocked = self.prompt_feedback.as_ref().is_some_and(|f| f.block_reason.is_some());
        let candidate_blocked = self.candidates.first().is_some_and(|c| {
            c.safety_ratings.iter().any(|r| r.blocked)
                || c.finish_reason
                    .as_deref()
                    .is_some_and(|reason| BLOCKING_FINISH_REASONS.contains(&reason))
        });
        prompt_blocked || candidate_blocked
    }

    fn into_image(self) -> Result<GeneratedImage, GenerationError> {
        let blocked = self.looks_blocked();
        let parts = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        let mut text = String::new();
        let mut image = None;
        for part in parts {
            if let Some(t) = part.text {
                text.push_str(&t);
            } else if let Some(inline) = part.inline_data {
                image = Some(inline);
            }
        }

        let Some(inline) = image else {
            return Err(GenerationError::NoImage { blocked, text });
        };

        let bytes = BASE64
            .decode(inline.data.as_bytes())
            .map_err(|e| GenerationError::InvalidResponse(format!("image data is not valid base64: {e}")))?;

        Ok(GeneratedImage {
            bytes,
            mime_type: inline.mime_type.unwrap_or_else(|| "image/png".to_string()),
            text,
        })
    }
}

/// [`ImageGenerator`] backed by the Gemini REST API.
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: Url,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.trim_start_matches("models/").to_string(),
            base_url: config.base_url.clone(),
        }
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GenerationError::MissingApiKey);
        };
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let method = format!("{}:generateContent", self.model);
        let url = with_segments(&self.base_url, ["v1beta", "models", method.as_str()])
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: RequestGenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            },
        };

        debug!(url = %url, "Requesting image generation");
        let response = self.client.post(url).header("x-goog-api-key", api_key).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "Gemini API returned an error");
            return Err(GenerationError::Api { status, body });
        }

        let body_text = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body_text)
            .map_err(|e| GenerationError::InvalidResponse(format!("error decoding response body: {e}")))?;

        let image = parsed.into_image()?;
        info!(bytes = image.bytes.len(), mime_type = %image.mime_type, "Image generated");
        if !image.text.is_empty() {
            debug!(text = %image.text, "Model text response");
        }
        Ok(image)
    }
}
