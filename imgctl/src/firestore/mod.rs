//! Read access to saved prompt records in Cloud Firestore.

pub mod timestamps;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::{debug, instrument};
use url::Url;
use utoipa::ToSchema;

use crate::credentials::{AccessTokenSource, TokenError};
use crate::http::with_segments;

const PAGE_SIZE: &str = "300";

/// A prompt and the agent response stored alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub id: String,
    pub agent_name: String,
    pub response_content: String,
    pub prompt_text: String,
    /// RFC 3339 creation time
    pub created_at: String,
}

#[derive(Debug, ThisError)]
pub enum RecordError {
    #[error("could not authorize database request: {0}")]
    Auth(#[from] TokenError),

    #[error("database request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid database URL: {0}")]
    Url(String),
}

/// Read-only access to prompt records.
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Every record, newest first.
    async fn list_all(&self) -> Result<Vec<PromptRecord>, RecordError>;

    /// A single record, or `None` if no record has this id.
    async fn get_by_id(&self, id: &str) -> Result<Option<PromptRecord>, RecordError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Document {
    fn into_record(self) -> PromptRecord {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_string();
        let fields = &self.fields;
        PromptRecord {
            agent_name: string_field(fields, &["agentName", "agent_name"]),
            response_content: string_field(fields, &["responseContent", "response_content"]),
            prompt_text: string_field(fields, &["promptText", "prompt_text", "prompt"]),
            created_at: timestamps::normalize(first_field(fields, &["createdAt", "created_at"]), Utc::now()),
            id,
        }
    }
}

fn first_field<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| fields.get(*name))
}

/// Read a Firestore value as a string. Non-string scalars are rendered; anything else is empty.
fn string_field(fields: &Map<String, Value>, names: &[&str]) -> String {
    let Some(Value::Object(value)) = first_field(fields, names) else {
        return String::new();
    };
    if let Some(s) = value.get("stringValue").and_then(Value::as_str) {
        return s.to_string();
    }
    ["integerValue", "doubleValue", "booleanValue"]
        .iter()
        .find_map(|kind| value.get(*kind))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// [`PromptStore`] over the Firestore REST API.
pub struct FirestorePromptStore {
    client: Client,
    tokens: Arc<dyn AccessTokenSource>,
    api_url: Url,
    project_id: String,
    database: String,
    collection: String,
}

impl FirestorePromptStore {
    pub fn new(
        client: Client,
        tokens: Arc<dyn AccessTokenSource>,
        api_url: Url,
        project_id: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            api_url,
            project_id: project_id.into(),
            database: database.into(),
            collection: collection.into(),
        }
    }

    fn collection_url(&self, document: Option<&str>) -> Result<Url, RecordError> {
        let mut segments = vec![
            "v1",
            "projects",
            self.project_id.as_str(),
            "databases",
            self.database.as_str(),
            "documents",
            self.collection.as_str(),
        ];
        segments.extend(document);
        with_segments(&self.api_url, segments).map_err(|e| RecordError::Url(e.to_string()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RecordError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(RecordError::Status { status, body })
    }
}

#[async_trait]
impl PromptStore for FirestorePromptStore {
    #[instrument(skip(self), fields(collection = %self.collection), err)]
    async fn list_all(&self) -> Result<Vec<PromptRecord>, RecordError> {
        let token = self.tokens.access_token().await?;
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.collection_url(None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", PAGE_SIZE);
                if let Some(page) = &page_token {
                    query.append_pair("pageToken", page);
                }
            }

            let response = self.client.get(url).bearer_auth(&token).send().await?;
            let page: ListDocumentsResponse = Self::check(response).await?.json().await?;
            records.extend(page.documents.into_iter().map(Document::into_record));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        // Fractional precision varies between records, so compare parsed values
        records.sort_by_cached_key(|r| std::cmp::Reverse(chrono::DateTime::parse_from_rfc3339(&r.created_at).ok()));
        debug!(count = records.len(), "Fetched prompt records");
        Ok(records)
    }

    #[instrument(skip(self), fields(collection = %self.collection), err)]
    async fn get_by_id(&self, id: &str) -> Result<Option<PromptRecord>, RecordError> {
        // Not valid document ids; as path segments they would resolve to the collection itself
        if matches!(id, "." | "..") || id.contains('/') {
            return Ok(None);
        }

        let token = self.tokens.access_token().await?;
        let url = self.collection_url(Some(id))?;

        let response = self.client.get(url).bearer_auth(&token).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document: Document = Self::check(response).await?.json().await?;
        Ok(Some(document.into_record()))
    }
}
