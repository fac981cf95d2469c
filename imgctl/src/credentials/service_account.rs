//! Service account key material, as downloaded from the Cloud console.

use serde::Deserialize;
use std::fmt;

use super::CredentialError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The subset of a service account JSON key we need to mint access tokens.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Parse and sanity-check a JSON key.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CredentialError> {
        let key: Self = serde_json::from_slice(bytes)?;

        if key.key_type != "service_account" {
            return Err(CredentialError::Incomplete(format!(
                "expected key type 'service_account', found '{}'",
                key.key_type
            )));
        }
        if key.client_email.trim().is_empty() {
            return Err(CredentialError::Incomplete("client_email is empty".to_string()));
        }
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(CredentialError::Incomplete("private_key is not a PEM encoded key".to_string()));
        }

        Ok(key)
    }
}
