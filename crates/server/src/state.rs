//! Application state shared across handlers.

use crate::engine::UploadEngine;
use resumable_core::UploadToken;
use resumable_core::config::AppConfig;
use resumable_metadata::MetadataStore;
use resumable_storage::ByteStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Byte storage backend.
    pub storage: Arc<dyn ByteStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload protocol engine over the two stores above.
    pub engine: UploadEngine,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ByteStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let engine = UploadEngine::new(
            storage.clone(),
            metadata.clone(),
            config.server.copy_chunk_size,
        );
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            engine,
        }
    }

    /// URL clients use to address an upload session.
    ///
    /// Absolute when `server.public_base_url` is set, otherwise a path.
    pub fn upload_location(&self, token: &UploadToken) -> String {
        let base = self
            .config
            .server
            .public_base_url
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/');
        format!("{base}/upload/{token}")
    }
}
