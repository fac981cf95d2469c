//! # imgctl: prompt to image service
//!
//! `imgctl` is a small HTTP service in front of the Gemini image model. A client posts a text
//! prompt, the service asks the model for an image, optionally stores the result in a Cloud
//! Storage bucket with a public URL, and answers with JSON carrying the URL and/or the image
//! itself as base64. A couple of read-only endpoints expose prompt records kept in Firestore and
//! the images stored under a user's folder.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). Every remote dependency sits behind
//! a trait so that handlers only see [`AppState`]:
//!
//! - [`gemini::ImageGenerator`], implemented by [`gemini::GeminiClient`]
//! - [`storage::BlobStore`], implemented by [`storage::GcsBlobStore`]
//! - [`firestore::PromptStore`], implemented by [`firestore::FirestorePromptStore`]
//!
//! Storage and the prompt database need Google credentials. At startup the
//! [`credentials::CredentialResolver`] walks the configured sources (inline base64, Secret Manager,
//! key file, ambient) and stops at the first that works. If none does, the service still starts:
//! generation keeps working and images are returned inline, while the read-only endpoints report
//! that their backend is unavailable.
//!
//! ### Request flow
//!
//! `POST /generate_and_upload` validates the body, calls the generator, derives an object name
//! from the prompt (or the supplied filename) plus a timestamp, and uploads. Upload failures are
//! not request failures: the response degrades to `partial_success` with the image inline.
//!
//! ## Configuration
//!
//! See [`config`] for the YAML file and environment variables.
//!
//! ## Observability
//!
//! Logging goes through `tracing`; see [`telemetry`] for OTLP export. Prometheus metrics are served
//! at `/internal/metrics` when `enable_metrics` is set.

pub mod api;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod firestore;
pub mod gemini;
pub mod http;
mod openapi;
mod static_assets;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, error, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::api::handlers::{generation, images, prompts, static_assets as assets};
use crate::config::CorsOrigin;
use crate::credentials::{AccessTokenSource, CredentialResolver, ResolvedCredential, TokenProvider};
use crate::firestore::{FirestorePromptStore, PromptStore};
use crate::gemini::{GeminiClient, ImageGenerator};
use crate::openapi::ApiDoc;
use crate::storage::{BlobStore, GcsBlobStore};

/// Shared state handed to every handler.
///
/// Built once at startup and never mutated. `blob_store` and `prompt_store` are `None` when
/// disabled in configuration or when no credential could be resolved.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .generator(Arc::new(GeminiClient::new(&config.gemini, client)))
///     .maybe_blob_store(blob_store)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub generator: Arc<dyn ImageGenerator>,
    pub blob_store: Option<Arc<dyn BlobStore>>,
    pub prompt_store: Option<Arc<dyn PromptStore>>,
}

/// Build the storage and database handles on top of a resolved credential. Either may come back
/// `None` when disabled or, for the database, when no project id is known.
fn build_backends(
    config: &Config,
    client: &reqwest::Client,
    resolved: &ResolvedCredential,
) -> (Option<Arc<dyn BlobStore>>, Option<Arc<dyn PromptStore>>) {
    let tokens: Arc<dyn AccessTokenSource> = Arc::new(TokenProvider::new(
        resolved.credential.clone(),
        client.clone(),
        config.credentials.metadata_url.clone(),
    ));

    let blob_store = if config.storage.enabled {
        info!(bucket = %config.storage.bucket, "Cloud Storage enabled");
        Some(Arc::new(GcsBlobStore::new(
            client.clone(),
            tokens.clone(),
            config.storage.bucket.clone(),
            config.storage.api_url.clone(),
            config.storage.public_url.clone(),
        )) as Arc<dyn BlobStore>)
    } else {
        None
    };

    let project_id = config.firestore.project_id.as_deref().or(resolved.project_id());
    let prompt_store = match (config.firestore.enabled, project_id) {
        (false, _) => None,
        (true, None) => {
            warn!("No Firestore project id configured and the credential carries none, prompt database disabled");
            None
        }
        (true, Some(project_id)) => {
            info!(project_id, collection = %config.firestore.collection, "Prompt database enabled");
            Some(Arc::new(FirestorePromptStore::new(
                client.clone(),
                tokens,
                config.firestore.api_url.clone(),
                project_id,
                config.firestore.database.clone(),
                config.firestore.collection.clone(),
            )) as Arc<dyn PromptStore>)
        }
    };

    (blob_store, prompt_store)
}

/// Construct the generator, resolve credentials, and build the storage and database handles.
///
/// Credential failure is not fatal: it is logged and both handles are left out.
#[instrument(skip_all)]
pub async fn setup_state(config: &Config) -> anyhow::Result<AppState> {
    let client = http::build_client(config.http.request_timeout)?;

    if config.gemini.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set, generation requests will fail");
    }
    let generator = Arc::new(GeminiClient::new(&config.gemini, client.clone()));

    let (blob_store, prompt_store) = if !config.storage.enabled && !config.firestore.enabled {
        info!("Storage and prompt database disabled, skipping credential resolution");
        (None, None)
    } else {
        match CredentialResolver::new(config.credentials.clone(), client.clone()).resolve().await {
            Ok(resolved) => build_backends(config, &client, &resolved),
            Err(e) => {
                error!(error = %e, "Credential initialization failed, storage and prompt database are unavailable");
                (None, None)
            }
        }
    };

    Ok(AppState::builder()
        .config(config.clone())
        .generator(generator)
        .maybe_blob_store(blob_store)
        .maybe_prompt_store(prompt_store)
        .build())
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allow_origin = if config.cors.allowed_origins.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry a path; Url always renders one
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: API routes, the bundled page, API docs, health check, and the
/// CORS, metrics and tracing layers.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/generate_and_upload", post(generation::generate_and_upload))
        .route("/generate_image", post(generation::generate_image))
        .route("/get_saved_prompts", get(prompts::get_saved_prompts))
        .route("/get_prompt/{id}", get(prompts::get_prompt))
        .route("/api/user_images/{user_uid}", get(images::list_user_images))
        .with_state(state.clone());

    let router = Router::new()
        .route("/", get(assets::serve_index))
        .route("/static/{*path}", get(assets::serve_static))
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The running service: [`Application::new`] wires everything up, [`Application::serve`] binds the
/// listener and runs until the shutdown future resolves.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting imgctl with configuration: {:#?}", config);

        let state = setup_state(&config).await?;
        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "imgctl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
