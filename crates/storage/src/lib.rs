//! Append-only byte storage for resumable uploads.
//!
//! This crate provides:
//! - The [`ByteStore`] trait: appending through a [`BlobAppender`], length query
//!   and delete by key
//! - A local filesystem backend with path traversal protection

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{BlobAppender, ByteStore};

use resumable_core::config::StorageConfig;
use std::sync::Arc;

/// Create a byte store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ByteStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
