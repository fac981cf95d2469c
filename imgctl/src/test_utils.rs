//! Test helpers: a preconfigured HTTP client and config, and in-memory backends.

use async_trait::async_trait;
use axum_test::TestServer;
use std::path::PathBuf;
use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use url::Url;

use crate::credentials::CredentialSource;
use crate::firestore::{PromptRecord, PromptStore, RecordError};
use crate::gemini::{GeneratedImage, GenerationError, ImageGenerator};
use crate::storage::{BlobStore, StoredImageRef, StoredObject, UploadError};
use crate::{AppState, Config};

pub const TEST_PUBLIC_URL: &str = "https://storage.test";
pub const TEST_BUCKET: &str = "bucket";

pub fn test_client() -> reqwest::Client {
    crate::http::build_client(Duration::from_secs(5)).expect("Failed to build test HTTP client")
}

/// Config that never reaches the network: the only credential source is a key file that does not
/// exist, so storage and the database stay disabled unless a test supplies a key.
pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    config.credentials.sources = vec![CredentialSource::KeyFile];
    config.credentials.key_file = PathBuf::from("/nonexistent/imgctl-test-key.json");
    config.storage.bucket = TEST_BUCKET.to_string();
    config.storage.public_url = Url::parse(TEST_PUBLIC_URL).unwrap();
    config
}

pub fn create_test_server(state: AppState) -> TestServer {
    let router = crate::build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

fn public_url(name: &str) -> String {
    format!("{TEST_PUBLIC_URL}/{TEST_BUCKET}/{name}")
}

/// Always returns the same image, recording the prompts it was asked for.
pub struct FixedGenerator {
    image: GeneratedImage,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FixedGenerator {
    pub fn new(bytes: &[u8], text: &str) -> Self {
        Self {
            image: GeneratedImage {
                bytes: bytes.to_vec(),
                mime_type: "image/png".to_string(),
                text: text.to_string(),
            },
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for FixedGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.image.clone())
    }
}

/// Fails every call with the error the closure builds.
pub struct FailingGenerator<F>(pub F);

#[async_trait]
impl<F> ImageGenerator for FailingGenerator<F>
where
    F: Fn() -> GenerationError + Send + Sync,
{
    async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, GenerationError> {
        Err((self.0)())
    }
}

/// In-memory bucket.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
    fail: bool,
}

impl MemoryBlobStore {
    /// A store whose every call fails with a 403.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn insert(&self, name: &str) {
        self.objects.lock().unwrap().push((name.to_string(), Vec::new()));
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.objects.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), UploadError> {
        if self.fail {
            return Err(UploadError::Status {
                operation: "upload object",
                status: 403,
                body: "forbidden".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bytes: &[u8], filename: &str, _content_type: &str) -> Result<StoredImageRef, UploadError> {
        self.check()?;
        self.objects.lock().unwrap().push((filename.to_string(), bytes.to_vec()));
        Ok(StoredImageRef {
            filename: filename.to_string(),
            public_url: public_url(filename),
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, UploadError> {
        self.check()?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix) && name != prefix)
            .map(|(name, _)| StoredObject {
                name: name.rsplit('/').next().unwrap_or(name).to_string(),
                full_path: name.clone(),
                url: public_url(name),
            })
            .collect())
    }
}

/// In-memory prompt records, returned in the order given.
#[derive(Default)]
pub struct MemoryPromptStore {
    records: Vec<PromptRecord>,
    fail: bool,
}

impl MemoryPromptStore {
    pub fn new(records: Vec<PromptRecord>) -> Self {
        Self { records, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            records: Vec::new(),
            fail: true,
        }
    }

    fn check(&self) -> Result<(), RecordError> {
        if self.fail {
            return Err(RecordError::Status {
                status: 500,
                body: "internal".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PromptStore for MemoryPromptStore {
    async fn list_all(&self) -> Result<Vec<PromptRecord>, RecordError> {
        self.check()?;
        Ok(self.records.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<PromptRecord>, RecordError> {
        self.check()?;
        Ok(self.records.iter().find(|r| r.id == id).cloned())
    }
}
