//! Server test utilities.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use bytes::Bytes;
use depot_core::ModuleIdentity;
use depot_core::config::{AppConfig, StorageConfig};
use depot_server::{AppState, create_router};
use depot_storage::ModuleStore;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Base URL the filesystem store hands out in tests.
#[allow(dead_code)]
pub const FILES_BASE_URL: &str = "https://files.example.com";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub store: Arc<dyn ModuleStore>,
    _temp_dir: TempDir,
}

/// Status, headers and raw body of a response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new open-access test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing(temp_dir.path().join("storage"));
        config.storage = StorageConfig::Filesystem {
            path: temp_dir.path().join("storage"),
            base_url: Some(FILES_BASE_URL.to_string()),
        };
        modifier(&mut config);

        let store = depot_storage::from_config(&config.storage, &config.archive.extension)
            .await
            .expect("Failed to create storage backend");
        let state = AppState::new(config, store.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Store an archive directly, bypassing the publisher.
    pub async fn seed(&self, namespace: &str, name: &str, provider: &str, version: &str) {
        let identity = ModuleIdentity::new(namespace, name, provider, version)
            .expect("invalid seed identity");
        self.store
            .upload_module(&identity, Bytes::from_static(b"archive"))
            .await
            .expect("Failed to seed module");
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }
}
