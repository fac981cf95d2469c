//! Image persistence in a blob store.
//!
//! [`BlobStore`] is the seam handlers talk to; [`gcs::GcsBlobStore`] is the Cloud Storage
//! implementation. Upload failures never fail a generation request: handlers fall back to
//! returning the image inline.

pub mod gcs;
pub mod naming;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

use crate::credentials::TokenError;

pub use gcs::GcsBlobStore;
pub use naming::object_name;

/// A stored, publicly readable object. `public_url` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImageRef {
    pub filename: String,
    pub public_url: String,
}

/// An object found by [`BlobStore::list`].
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StoredObject {
    /// Last path component of the object name
    pub name: String,
    /// Full object name within the bucket
    pub full_path: String,
    /// Public URL of the object
    pub url: String,
}

#[derive(Debug, ThisError)]
pub enum UploadError {
    #[error("could not authorize storage request: {0}")]
    Auth(#[from] TokenError),

    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage returned {status} while trying to {operation}: {body}")]
    Status { operation: &'static str, status: u16, body: String },

    #[error("invalid storage URL: {0}")]
    Url(String),
}

/// A bucket of binary objects with public URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under `filename`, make the object publicly readable, and return its URL.
    async fn upload(&self, bytes: &[u8], filename: &str, content_type: &str) -> Result<StoredImageRef, UploadError>;

    /// List objects whose name starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, UploadError>;
}
