//! Service credential resolution.
//!
//! Storage and the prompt database both need Google credentials. They can come from several
//! places, tried in the configured order until one works:
//!
//! - [`CredentialSource::InlineBase64`]: a base64 encoded service account key in configuration
//!   (usually `GOOGLE_CREDENTIALS_BASE64`)
//! - [`CredentialSource::SecretManager`]: a service account key stored in Secret Manager, fetched
//!   with ambient credentials
//! - [`CredentialSource::KeyFile`]: a key file on local disk
//! - [`CredentialSource::Ambient`]: `GOOGLE_APPLICATION_CREDENTIALS`, or the metadata server when
//!   running on Google infrastructure
//!
//! Failures are logged and the next source is tried. If every source fails the caller gets
//! [`CredentialError::Exhausted`] and is expected to run without storage and database access.

pub mod service_account;
pub mod token;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, sync::Arc};
use thiserror::Error as ThisError;
use tracing::{info, instrument, warn};

use crate::config::CredentialsConfig;
use crate::http::with_segments;
pub use service_account::ServiceAccountKey;
pub use token::{AccessTokenSource, TokenError, TokenProvider};

/// Where a credential may be loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    InlineBase64,
    SecretManager,
    KeyFile,
    Ambient,
}

impl CredentialSource {
    pub fn default_order() -> Vec<Self> {
        vec![Self::InlineBase64, Self::SecretManager, Self::KeyFile, Self::Ambient]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InlineBase64 => "inline_base64",
            Self::SecretManager => "secret_manager",
            Self::KeyFile => "key_file",
            Self::Ambient => "ambient",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential material for minting access tokens.
#[derive(Debug, Clone)]
pub enum Credential {
    ServiceAccount(Arc<ServiceAccountKey>),
    MetadataServer,
}

/// A credential together with the source that produced it.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub source: CredentialSource,
}

impl ResolvedCredential {
    /// Project id embedded in the key, if any. Metadata server credentials carry none.
    pub fn project_id(&self) -> Option<&str> {
        match &self.credential {
            Credential::ServiceAccount(key) => key.project_id.as_deref(),
            Credential::MetadataServer => None,
        }
    }
}

#[derive(Debug, ThisError)]
pub enum CredentialError {
    #[error("{0}")]
    NotConfigured(String),

    #[error("invalid base64 credential: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid service account JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("service account key is unusable: {0}")]
    Incomplete(String),

    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Secret Manager request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Secret Manager returned {status}: {body}")]
    SecretManager { status: u16, body: String },

    #[error("no credential source succeeded ({})", summarize(.attempts))]
    Exhausted { attempts: Vec<(CredentialSource, String)> },
}

fn summarize(attempts: &[(CredentialSource, String)]) -> String {
    if attempts.is_empty() {
        return "no sources configured".to_string();
    }
    attempts
        .iter()
        .map(|(source, error)| format!("{source}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

/// Tries credential sources in order, stopping at the first that yields a usable credential.
pub struct CredentialResolver {
    config: CredentialsConfig,
    client: Client,
    application_credentials: Option<PathBuf>,
}

impl CredentialResolver {
    pub fn new(config: CredentialsConfig, client: Client) -> Self {
        let application_credentials = std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            config,
            client,
            application_credentials,
        }
    }

    /// Override the `GOOGLE_APPLICATION_CREDENTIALS` path picked up from the environment.
    pub fn with_application_credentials(mut self, path: Option<PathBuf>) -> Self {
        self.application_credentials = path;
        self
    }

    #[instrument(skip_all)]
    pub async fn resolve(&self) -> Result<ResolvedCredential, CredentialError> {
        let mut attempts = Vec::new();

        for &source in &self.config.sources {
            match self.try_source(source).await {
                Ok(credential) => {
                    info!(source = %source, "Resolved service credentials");
                    return Ok(ResolvedCredential { credential, source });
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Credential source failed, trying next");
                    attempts.push((source, e.to_string()));
                }
            }
        }

        Err(CredentialError::Exhausted { attempts })
    }

    async fn try_source(&self, source: CredentialSource) -> Result<Credential, CredentialError> {
        match source {
            CredentialSource::InlineBase64 => self.from_inline(),
            CredentialSource::SecretManager => self.from_secret_manager().await,
            CredentialSource::KeyFile => self.from_key_file(&self.config.key_file).await,
            CredentialSource::Ambient => self.from_ambient().await,
        }
    }

    fn from_inline(&self) -> Result<Credential, CredentialError> {
        let encoded = self
            .config
            .inline_base64
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CredentialError::NotConfigured("no inline credential configured".to_string()))?;

        let json = BASE64.decode(encoded)?;
        let key = ServiceAccountKey::from_json(&json)?;
        Ok(Credential::ServiceAccount(Arc::new(key)))
    }

    async fn from_secret_manager(&self) -> Result<Credential, CredentialError> {
        let (Some(project), Some(secret)) = (self.config.secret_project.as_deref(), self.config.secret_name.as_deref()) else {
            return Err(CredentialError::NotConfigured(
                "secret_project and secret_name must both be configured".to_string(),
            ));
        };

        // The secret itself is read with whatever ambient identity the process has
        let ambient = self.ambient_credential();
        let tokens = TokenProvider::new(ambient, self.client.clone(), self.config.metadata_url.clone());
        let token = tokens.access_token().await?;

        let version = format!("{}:access", self.config.secret_version);
        let url = with_segments(
            &self.config.secret_manager_url,
            ["v1", "projects", project, "secrets", secret, "versions", version.as_str()],
        )
        .map_err(|e| CredentialError::NotConfigured(e.to_string()))?;

        let response = self.client.get(url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::SecretManager { status, body });
        }

        let secret: AccessSecretVersionResponse = response.json().await?;
        let json = BASE64.decode(secret.payload.data.trim())?;
        let key = ServiceAccountKey::from_json(&json)?;
        Ok(Credential::ServiceAccount(Arc::new(key)))
    }

    async fn from_key_file(&self, path: &std::path::Path) -> Result<Credential, CredentialError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let key = ServiceAccountKey::from_json(&bytes)?;
        Ok(Credential::ServiceAccount(Arc::new(key)))
    }

    /// Ambient credentials are usable if the application-default key file parses, or the
    /// metadata server hands out a token.
    async fn from_ambient(&self) -> Result<Credential, CredentialError> {
        if let Some(path) = &self.application_credentials {
            return self.from_key_file(path).await;
        }

        let probe = TokenProvider::new(Credential::MetadataServer, self.client.clone(), self.config.metadata_url.clone());
        probe.access_token().await?;
        Ok(Credential::MetadataServer)
    }

    /// Identity used to read the secret: the application-default key when it parses, otherwise
    /// the metadata server.
    fn ambient_credential(&self) -> Credential {
        self.application_credentials
            .as_ref()
            .and_then(|path| std::fs::read(path).ok())
            .and_then(|bytes| ServiceAccountKey::from_json(&bytes).ok())
            .map(|key| Credential::ServiceAccount(Arc::new(key)))
            .unwrap_or(Credential::MetadataServer)
    }
}
