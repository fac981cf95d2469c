//! Cloud Storage implementation of [`BlobStore`] over the JSON API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

use super::{BlobStore, StoredImageRef, StoredObject, UploadError};
use crate::credentials::AccessTokenSource;
use crate::http::with_segments;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
}

pub struct GcsBlobStore {
    client: Client,
    tokens: Arc<dyn AccessTokenSource>,
    bucket: String,
    api_url: Url,
    public_url: Url,
}

impl GcsBlobStore {
    pub fn new(client: Client, tokens: Arc<dyn AccessTokenSource>, bucket: impl Into<String>, api_url: Url, public_url: Url) -> Self {
        Self {
            client,
            tokens,
            bucket: bucket.into(),
            api_url,
            public_url,
        }
    }

    /// `{public_url}/{bucket}/{name}`, keeping `/` in the object name as path separators.
    fn public_url_for(&self, name: &str) -> Result<String, UploadError> {
        let segments = std::iter::once(self.bucket.as_str()).chain(name.split('/'));
        let url = with_segments(&self.public_url, segments).map_err(|e| UploadError::Url(e.to_string()))?;
        Ok(url.to_string())
    }

    fn objects_url(&self, upload: bool) -> Result<Url, UploadError> {
        let mut segments = vec!["storage", "v1", "b", self.bucket.as_str(), "o"];
        if upload {
            segments.insert(0, "upload");
        }
        with_segments(&self.api_url, segments).map_err(|e| UploadError::Url(e.to_string()))
    }

    async fn check(response: reqwest::Response, operation: &'static str) -> Result<reqwest::Response, UploadError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Status { operation, status, body })
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    #[instrument(skip(self, bytes), fields(bucket = %self.bucket, size = bytes.len()), err)]
    async fn upload(&self, bytes: &[u8], filename: &str, content_type: &str) -> Result<StoredImageRef, UploadError> {
        let token = self.tokens.access_token().await?;

        let mut upload_url = self.objects_url(true)?;
        upload_url
            .query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", filename);

        let response = self
            .client
            .post(upload_url)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await?;
        Self::check(response, "upload object").await?;
        debug!(filename, "Object uploaded, making it public");

        let mut acl_url = self.objects_url(false)?;
        acl_url
            .path_segments_mut()
            .map_err(|_| UploadError::Url("storage API URL cannot be a base".to_string()))?
            .push(filename)
            .push("acl");

        let response = self
            .client
            .post(acl_url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "entity": "allUsers", "role": "READER" }))
            .send()
            .await?;
        Self::check(response, "make object public").await?;

        let public_url = self.public_url_for(filename)?;
        info!(filename, url = %public_url, "Image stored");
        Ok(StoredImageRef {
            filename: filename.to_string(),
            public_url,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket), err)]
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, UploadError> {
        let token = self.tokens.access_token().await?;
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.objects_url(false)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                if let Some(page) = &page_token {
                    query.append_pair("pageToken", page);
                }
            }

            let response = self.client.get(url).bearer_auth(&token).send().await?;
            let page: ListObjectsResponse = Self::check(response, "list objects").await?.json().await?;

            for object in page.items {
                // Skip the folder placeholder itself
                if object.name == prefix {
                    continue;
                }
                let name = object.name.rsplit('/').next().unwrap_or(&object.name).to_string();
                objects.push(StoredObject {
                    name,
                    url: self.public_url_for(&object.name)?,
                    full_path: object.name,
                });
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }
}
