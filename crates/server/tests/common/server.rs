//! Server test utilities.

use super::fixtures::sha256_hash;
use axum::body::Body;
use axum::http::{Request, Response};
use resumable_core::config::{AdminConfig, AppConfig, MetadataConfig, ServerConfig, StorageConfig};
use resumable_core::protocol::{HEADER_INTEROP_VERSION, INTEROP_VERSION};
use resumable_metadata::models::TokenRow;
use resumable_metadata::repos::TokenRepo;
use resumable_metadata::{MetadataStore, SqliteStore};
use resumable_server::bootstrap::ensure_admin_token;
use resumable_server::{AppState, create_router};
use resumable_storage::{ByteStore, FilesystemBackend};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ByteStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            server: ServerConfig::default(),
            storage: StorageConfig::Filesystem {
                path: storage_path,
            },
            metadata: MetadataConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
            admin: AdminConfig::for_testing(),
        };
        modifier(&mut config);

        ensure_admin_token(metadata.as_ref(), &config.admin)
            .await
            .expect("Failed to bootstrap admin token");

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying byte store.
    pub fn storage(&self) -> Arc<dyn ByteStore> {
        self.state.storage.clone()
    }

    /// Insert a caller token directly and return its raw secret.
    pub async fn create_token(&self, owner_id: &str, scopes: &str) -> String {
        let raw_token = format!("test-token-{}", Uuid::new_v4());

        let token = TokenRow {
            token_id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            token_hash: sha256_hash(raw_token.as_bytes()),
            scopes: scopes.to_string(),
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
            last_used_at: None,
            description: Some("Test Token".to_string()),
        };

        self.metadata()
            .create_token(&token)
            .await
            .expect("Failed to create token");

        raw_token
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Build an upload request speaking the current interop version.
///
/// `Content-Length` is set from `body`, as a real client would.
#[allow(dead_code)]
pub fn upload_request(
    method: &str,
    uri: &str,
    auth_token: Option<&str>,
    headers: &[(&str, &str)],
    body: &[u8],
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(HEADER_INTEROP_VERSION, INTEROP_VERSION)
        .header("content-length", body.len());

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    builder.body(Body::from(body.to_vec())).unwrap()
}

/// Read a response body to bytes.
#[allow(dead_code)]
pub async fn body_bytes(response: Response<Body>) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}
