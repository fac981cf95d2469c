//! OAuth2 access tokens for Google APIs.
//!
//! Service account credentials are exchanged with the JWT bearer grant (RFC 7523): we sign a short
//! lived assertion with the key's private key and post it to the key's `token_uri`. Ambient
//! credentials on Compute Engine / Cloud Run come from the metadata server instead.
//!
//! Tokens are cached until shortly before they expire. The cache sits behind a `tokio` mutex so
//! that a burst of requests arriving with an expired token triggers a single refresh.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use super::Credential;
use crate::http::with_segments;

/// Scope requested for every token; storage, Firestore and Secret Manager all accept it.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, ThisError)]
pub enum TokenError {
    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid token endpoint URL: {0}")]
    Url(String),
}

/// Anything that can hand out bearer tokens for Google APIs.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, TokenError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// When a token issued at `now` with the reported lifetime expires. Lifetimes that do not fit in
/// a timestamp fall back to the default hour.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or_else(|| now + Duration::seconds(default_expires_in()))
}

/// Caching token provider for a resolved [`Credential`].
pub struct TokenProvider {
    credential: Credential,
    client: Client,
    metadata_url: Url,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(credential: Credential, client: Client, metadata_url: Url) -> Self {
        Self {
            credential,
            client,
            metadata_url,
            cache: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken, TokenError> {
        let response = match &self.credential {
            Credential::ServiceAccount(key) => {
                let now = Utc::now();
                let claims = AssertionClaims {
                    iss: &key.client_email,
                    scope: CLOUD_PLATFORM_SCOPE,
                    aud: &key.token_uri,
                    iat: now.timestamp(),
                    exp: (now + Duration::hours(1)).timestamp(),
                };
                let mut header = Header::new(Algorithm::RS256);
                header.kid = key.private_key_id.clone();
                let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
                let assertion = jsonwebtoken::encode(&header, &claims, &signing_key)?;

                let body = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("grant_type", JWT_BEARER_GRANT)
                    .append_pair("assertion", &assertion)
                    .finish();

                debug!(token_uri = %key.token_uri, "Exchanging service account assertion for access token");
                self.client
                    .post(&key.token_uri)
                    .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body)
                    .send()
                    .await?
            }
            Credential::MetadataServer => {
                let url = with_segments(
                    &self.metadata_url,
                    ["computeMetadata", "v1", "instance", "service-accounts", "default", "token"],
                )
                .map_err(|e| TokenError::Url(e.to_string()))?;

                debug!(url = %url, "Fetching access token from metadata server");
                self.client.get(url).header("Metadata-Flavor", "Google").send().await?
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Status { status, body });
        }

        let token: TokenResponse = response.json().await?;
        Ok(CachedToken {
            value: token.access_token,
            expires_at: expiry_after(Utc::now(), token.expires_in),
        })
    }
}

#[async_trait]
impl AccessTokenSource for TokenProvider {
    #[instrument(skip(self), err)]
    async fn access_token(&self) -> Result<String, TokenError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref()
            && token.is_fresh(Utc::now())
        {
            return Ok(token.value.clone());
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cache = Some(token);
        Ok(value)
    }
}

/// A fixed token.
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, TokenError> {
        Ok(self.0.clone())
    }
}
