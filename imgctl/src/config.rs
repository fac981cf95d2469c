//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `IMGCTL_CONFIG`
//! environment variable. A missing file is not an error; every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `IMGCTL_` override YAML values
//! 3. **Well-known variables** - `GEMINI_API_KEY`, `FIREBASE_STORAGE_BUCKET` and
//!    `GOOGLE_CREDENTIALS_BASE64` map onto `gemini.api_key`, `storage.bucket` and
//!    `credentials.inline_base64`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `IMGCTL_FIRESTORE__COLLECTION=prompt_log` sets the `firestore.collection` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! IMGCTL_PORT=8080
//!
//! # Gemini API key
//! GEMINI_API_KEY="AIza..."
//!
//! # Service account key, base64 encoded
//! GOOGLE_CREDENTIALS_BASE64="$(base64 -w0 service_account_key.json)"
//!
//! # Only try the key file and ambient credentials
//! IMGCTL_CREDENTIALS__SOURCES='[key_file, ambient]'
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, path::PathBuf, time::Duration};
use url::Url;

use crate::credentials::CredentialSource;
use crate::errors::Error;

/// Default bucket used when neither the config file nor `FIREBASE_STORAGE_BUCKET` names one.
pub const DEFAULT_BUCKET: &str = "image-gen-34b6b.firebasestorage.app";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IMGCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Log filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Outbound HTTP client settings shared by every remote call
    pub http: HttpConfig,
    /// Image model settings
    pub gemini: GeminiConfig,
    /// Where service credentials for storage and the prompt database come from
    pub credentials: CredentialsConfig,
    /// Cloud Storage bucket for generated images
    pub storage: StorageConfig,
    /// Firestore collection holding saved prompt records
    pub firestore: FirestoreConfig,
    /// CORS settings
    pub cors: CorsConfig,
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Upper bound for any single remote call (generation, upload, query, token fetch)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Gemini image generation configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeminiConfig {
    /// API key (usually provided through `GEMINI_API_KEY`)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model used for `generateContent`
    pub model: String,
    /// Base URL of the Generative Language API
    pub base_url: Url,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash-exp-image-generation".to_string(),
            base_url: Url::parse("https://generativelanguage.googleapis.com").expect("valid default URL"),
        }
    }
}

/// Credential resolution configuration.
///
/// `sources` is tried in order and resolution stops at the first source that yields a usable
/// credential.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsConfig {
    pub sources: Vec<CredentialSource>,
    /// Base64 encoded service account JSON (usually provided through `GOOGLE_CREDENTIALS_BASE64`)
    #[serde(skip_serializing)]
    pub inline_base64: Option<String>,
    /// Project holding the service account secret
    pub secret_project: Option<String>,
    /// Secret Manager secret name holding the service account JSON
    pub secret_name: Option<String>,
    /// Secret version to access
    pub secret_version: String,
    /// Local service account key file
    pub key_file: PathBuf,
    /// Secret Manager API base URL
    pub secret_manager_url: Url,
    /// Compute metadata server base URL, used for ambient credentials
    pub metadata_url: Url,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("sources", &self.sources)
            .field("inline_base64", &self.inline_base64.as_ref().map(|_| "<redacted>"))
            .field("secret_project", &self.secret_project)
            .field("secret_name", &self.secret_name)
            .field("secret_version", &self.secret_version)
            .field("key_file", &self.key_file)
            .field("secret_manager_url", &self.secret_manager_url.as_str())
            .field("metadata_url", &self.metadata_url.as_str())
            .finish()
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            sources: CredentialSource::default_order(),
            inline_base64: None,
            secret_project: None,
            secret_name: None,
            secret_version: "latest".to_string(),
            key_file: PathBuf::from("service_account_key.json"),
            secret_manager_url: Url::parse("https://secretmanager.googleapis.com").expect("valid default URL"),
            metadata_url: Url::parse("http://metadata.google.internal").expect("valid default URL"),
        }
    }
}

/// Cloud Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Build a storage handle when credentials resolve
    pub enabled: bool,
    /// Bucket name (usually provided through `FIREBASE_STORAGE_BUCKET`)
    pub bucket: String,
    /// JSON API base URL
    pub api_url: Url,
    /// Base URL for public object links
    pub public_url: Url,
    /// Folder holding per-user images, listed by `/api/user_images/{uid}`
    pub user_images_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bucket: DEFAULT_BUCKET.to_string(),
            api_url: Url::parse("https://storage.googleapis.com").expect("valid default URL"),
            public_url: Url::parse("https://storage.googleapis.com").expect("valid default URL"),
            user_images_prefix: "user_images".to_string(),
        }
    }
}

/// Firestore configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FirestoreConfig {
    /// Build a database handle when credentials resolve
    pub enabled: bool,
    /// Project id; defaults to the service account's project
    pub project_id: Option<String>,
    /// Database id
    pub database: String,
    /// Collection holding prompt records
    pub collection: String,
    /// Firestore REST API base URL
    pub api_url: Url,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_id: None,
            database: "(default)".to_string(),
            collection: "prompts".to_string(),
            api_url: Url::parse("https://firestore.googleapis.com").expect("valid default URL"),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Preflight cache duration in seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: Some(3600),
        }
    }
}

/// A single allowed CORS origin: either `*` or a concrete URL.
#[derive(Debug, Clone, PartialEq)]
pub enum CorsOrigin {
    Wildcard,
    Url(Url),
}

impl Serialize for CorsOrigin {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CorsOrigin::Wildcard => serializer.serialize_str("*"),
            CorsOrigin::Url(url) => serializer.serialize_str(url.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for CorsOrigin {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "*" {
            Ok(CorsOrigin::Wildcard)
        } else {
            Url::parse(&s).map(CorsOrigin::Url).map_err(serde::de::Error::custom)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            enable_metrics: false,
            enable_otel_export: false,
            log_filter: "info".to_string(),
            http: HttpConfig::default(),
            gemini: GeminiConfig::default(),
            credentials: CredentialsConfig::default(),
            storage: StorageConfig::default(),
            firestore: FirestoreConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.gemini.model.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: gemini.model cannot be empty".to_string(),
            });
        }

        if self.http.request_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: http.request_timeout must be greater than zero".to_string(),
            });
        }

        if self.credentials.sources.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: credentials.sources cannot be empty. Add at least one source (e.g. ambient)."
                    .to_string(),
            });
        }

        let mut seen = HashSet::new();
        for source in &self.credentials.sources {
            if !seen.insert(source) {
                return Err(Error::Internal {
                    operation: format!("Config validation: credential source '{source}' is listed more than once"),
                });
            }
        }

        if self.storage.enabled && self.storage.bucket.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.bucket cannot be empty while storage is enabled. \
                            Set FIREBASE_STORAGE_BUCKET or disable storage."
                    .to_string(),
            });
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values. IMGCTL_CONFIG names the
            // file itself and is read by clap
            .merge(Env::prefixed("IMGCTL_").ignore(&["config"]).split("__"))
            // Well-known variables shared with other tooling
            .merge(Env::raw().only(&["GEMINI_API_KEY"]).map(|_| "gemini.api_key".into()))
            .merge(Env::raw().only(&["FIREBASE_STORAGE_BUCKET"]).map(|_| "storage.bucket".into()))
            .merge(
                Env::raw()
                    .only(&["GOOGLE_CREDENTIALS_BASE64"])
                    .map(|_| "credentials.inline_base64".into()),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 5000);
            assert_eq!(config.storage.bucket, DEFAULT_BUCKET);
            assert_eq!(config.gemini.model, "gemini-2.0-flash-exp-image-generation");
            assert_eq!(config.credentials.sources, CredentialSource::default_order());
            assert_eq!(config.credentials.key_file, PathBuf::from("service_account_key.json"));
            assert_eq!(config.http.request_timeout, Duration::from_secs(60));

            Ok(())
        });
    }

    #[test]
    fn test_yaml_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 8080
http:
  request_timeout: 15s
firestore:
  collection: prompt_log
credentials:
  sources: [key_file, ambient]
  key_file: /etc/imgctl/key.json
"#,
            )?;

            jail.set_env("IMGCTL_HOST", "127.0.0.1");
            jail.set_env("IMGCTL_FIRESTORE__DATABASE", "images");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.http.request_timeout, Duration::from_secs(15));
            assert_eq!(config.firestore.collection, "prompt_log");
            assert_eq!(config.firestore.database, "images");
            assert_eq!(
                config.credentials.sources,
                vec![CredentialSource::KeyFile, CredentialSource::Ambient]
            );
            assert_eq!(config.credentials.key_file, PathBuf::from("/etc/imgctl/key.json"));

            Ok(())
        });
    }

    #[test]
    fn test_config_path_env_var_is_not_a_setting() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.yaml", "port: 7070\n")?;
            jail.set_env("IMGCTL_CONFIG", "custom.yaml");

            let config = Config::load(&args("custom.yaml"))?;

            assert_eq!(config.port, 7070);

            Ok(())
        });
    }

    #[test]
    fn test_well_known_env_vars() {
        Jail::expect_with(|jail| {
            jail.set_env("GEMINI_API_KEY", "test-gemini-key");
            jail.set_env("FIREBASE_STORAGE_BUCKET", "my-bucket.appspot.com");
            jail.set_env("GOOGLE_CREDENTIALS_BASE64", "e30=");

            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.gemini.api_key.as_deref(), Some("test-gemini-key"));
            assert_eq!(config.storage.bucket, "my-bucket.appspot.com");
            assert_eq!(config.credentials.inline_base64.as_deref(), Some("e30="));

            Ok(())
        });
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.gemini.api_key = Some("super-secret-key".to_string());
        config.credentials.inline_base64 = Some("c2VjcmV0".to_string());

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret-key"));
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_validation_rejects_empty_sources() {
        let mut config = Config::default();
        config.credentials.sources.clear();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("credentials.sources"));
    }

    #[test]
    fn test_validation_rejects_duplicate_sources() {
        let mut config = Config::default();
        config.credentials.sources = vec![CredentialSource::KeyFile, CredentialSource::KeyFile];

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = Config::default();
        config.http.request_timeout = Duration::ZERO;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_bucket_only_when_enabled() {
        let mut config = Config::default();
        config.storage.bucket = " ".to_string();
        assert!(config.validate().is_err());

        config.storage.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cors_origin_parsing() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
cors:
  allowed_origins: ["*", "https://images.example.com"]
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;
            assert_eq!(config.cors.allowed_origins[0], CorsOrigin::Wildcard);
            assert_eq!(
                config.cors.allowed_origins[1],
                CorsOrigin::Url(Url::parse("https://images.example.com").unwrap())
            );

            Ok(())
        });
    }
}
