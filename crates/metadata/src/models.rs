//! Database row models.

use crate::error::{MetadataError, MetadataResult};
use resumable_core::{UploadSession, UploadToken};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Upload session record.
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub token: String,
    pub owner_id: String,
    pub storage_path: String,
    pub declared_size: Option<i64>,
    pub complete: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UploadSessionRow {
    /// Convert a domain session into a row.
    ///
    /// Sizes are stored in a signed column, so anything above `i64::MAX` is
    /// rejected with `Internal`.
    pub fn from_session(session: &UploadSession) -> MetadataResult<Self> {
        let declared_size = session
            .declared_size
            .map(|size| {
                i64::try_from(size).map_err(|_| {
                    MetadataError::Internal(format!("declared size {size} exceeds i64::MAX"))
                })
            })
            .transpose()?;

        Ok(Self {
            token: session.token.to_string(),
            owner_id: session.owner_id.clone(),
            storage_path: session.storage_path.clone(),
            declared_size,
            complete: session.complete,
            created_at: session.created_at,
            updated_at: session.updated_at,
        })
    }
}

impl TryFrom<UploadSessionRow> for UploadSession {
    type Error = MetadataError;

    fn try_from(row: UploadSessionRow) -> MetadataResult<Self> {
        let token = UploadToken::parse(&row.token)
            .map_err(|e| MetadataError::Internal(format!("corrupt session token: {e}")))?;
        let declared_size = row
            .declared_size
            .map(|size| {
                u64::try_from(size).map_err(|_| {
                    MetadataError::Internal(format!(
                        "negative declared size {size} for session {token}"
                    ))
                })
            })
            .transpose()?;

        Ok(UploadSession {
            token,
            owner_id: row.owner_id,
            storage_path: row.storage_path,
            declared_size,
            complete: row.complete,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Caller token record.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub owner_id: String,
    pub token_hash: String,
    pub scopes: String, // JSON array
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}
