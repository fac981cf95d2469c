use crate::api::models::generation::GenerationStatus;
use crate::firestore::RecordError;
use crate::gemini::GenerationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data (wrong content type, missing or empty fields)
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// A backing service (storage, database) was never initialized for this process
    #[error("{service} is not available")]
    Unavailable { service: String },

    /// The image model did not produce an image
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message.
    ///
    /// Generation failures are passed through verbatim since the model's diagnostic text is the
    /// only useful thing the caller can act on.
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Unavailable { service } => format!("{service} is not available"),
            Error::Generation(e) => e.to_string(),
            Error::Internal { operation } => format!("Failed to {operation}"),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }

    fn log(&self) {
        match self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Generation(_) | Error::Unavailable { .. } => {
                tracing::warn!("Upstream error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }
    }
}

/// Error body used by the generation endpoints: `{"status": "error", "message": ...}`.
#[derive(Debug, Serialize)]
struct StatusEnvelope {
    status: GenerationStatus,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.log();
        let body = StatusEnvelope {
            status: GenerationStatus::Error,
            message: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Error wrapper for the prompt record endpoints, which report failures as
/// `{"success": false, "message": ...}` (plus an empty `prompts` list for the listing endpoint).
#[derive(Debug)]
pub struct RecordsError {
    pub error: Error,
    pub with_empty_list: bool,
}

#[derive(Debug, Serialize)]
struct SuccessEnvelope {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompts: Option<Vec<()>>,
}

impl RecordsError {
    /// Wrap an error for an endpoint that returns a list of records.
    pub fn listing(error: impl Into<Error>) -> Self {
        Self {
            error: error.into(),
            with_empty_list: true,
        }
    }
}

impl From<Error> for RecordsError {
    fn from(error: Error) -> Self {
        Self {
            error,
            with_empty_list: false,
        }
    }
}

impl IntoResponse for RecordsError {
    fn into_response(self) -> Response {
        self.error.log();
        let body = SuccessEnvelope {
            success: false,
            message: self.error.user_message(),
            prompts: self.with_empty_list.then(Vec::new),
        };
        (self.error.status_code(), Json(body)).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<RecordError> for Error {
    fn from(e: RecordError) -> Self {
        Error::Other(anyhow::Error::new(e).context("prompt database query failed"))
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_uses_status_envelope() {
        let response = Error::BadRequest {
            message: "Please provide a prompt for the image.".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Please provide a prompt for the image.");
    }

    #[tokio::test]
    async fn test_other_errors_do_not_leak_details() {
        let response = Error::Other(anyhow::anyhow!("connection refused to 10.0.0.3")).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_records_error_listing_includes_empty_prompts() {
        let response = RecordsError::listing(Error::Unavailable {
            service: "Prompt database".to_string(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Prompt database is not available");
        assert_eq!(json["prompts"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_records_error_not_found_omits_prompts() {
        let response = RecordsError::from(Error::NotFound {
            resource: "Prompt".to_string(),
            id: "abc".to_string(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Prompt with ID abc not found");
        assert!(json.get("prompts").is_none());
    }
}
