//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Open handle appending to one blob.
///
/// Writes are visible to [`ByteStore::length`] as soon as `write` returns;
/// they are durable once `sync` returns.
#[async_trait]
pub trait BlobAppender: Send {
    /// Append data at the current end of the blob.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Make everything written through this handle durable.
    async fn sync(&mut self) -> StorageResult<()>;
}

/// Append-only byte storage.
///
/// Each key holds one blob that only ever grows.
#[async_trait]
pub trait ByteStore: Send + Sync + 'static {
    /// Open the blob at `key` for appending, creating it if absent.
    async fn open_appender(&self, key: &str) -> StorageResult<Box<dyn BlobAppender>>;

    /// Durably append data to the blob at `key`, creating it if absent.
    ///
    /// Appending empty data creates an empty blob.
    async fn append(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let mut appender = self.open_appender(key).await?;
        appender.write(data).await?;
        appender.sync().await
    }

    /// Current length of the blob in bytes.
    ///
    /// Returns `StorageError::NotFound` if the blob does not exist.
    async fn length(&self, key: &str) -> StorageResult<u64>;

    /// Delete the blob.
    ///
    /// Returns `StorageError::NotFound` if the blob does not exist.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Get the backend name for logging and metrics.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and writable.
    ///
    /// Default implementation probes a key that is not expected to exist.
    async fn health_check(&self) -> StorageResult<()> {
        match self.length(".health_check_probe").await {
            Ok(_) | Err(crate::error::StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
