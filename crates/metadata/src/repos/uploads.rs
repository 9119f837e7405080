//! Upload session repository.

use crate::error::MetadataResult;
use crate::models::UploadSessionRow;
use async_trait::async_trait;

/// Repository for upload session records.
///
/// Every lookup is scoped to the owner, so a token belonging to another
/// caller behaves exactly like an unknown token.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Persist a new session. Fails with `AlreadyExists` on a token collision.
    async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()>;

    /// Find a session by owner and token.
    async fn find_session(
        &self,
        owner_id: &str,
        token: &str,
    ) -> MetadataResult<Option<UploadSessionRow>>;

    /// Persist completion state and declared size.
    ///
    /// `complete` can only move from false to true, and a declared size that is
    /// already set is never replaced. Returns `NotFound` if the session is gone.
    async fn update_session(&self, session: &UploadSessionRow) -> MetadataResult<()>;

    /// Delete a session record. Returns whether a row was removed.
    async fn delete_session(&self, owner_id: &str, token: &str) -> MetadataResult<bool>;
}
