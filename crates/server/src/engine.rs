//! Resumable upload state machine.
//!
//! The engine is transport independent: handlers hand it the caller identity,
//! the parsed [`UploadHeaders`] and a body stream, and get back an outcome or
//! an [`ApiError`] describing which protocol rule was violated.
//!
//! Every entry point checks, in order: caller identity, interop version, then
//! operation-specific header rules, then session lookup.
//!
//! Appends and deletes on one session are serialized within the process by a
//! per-token lock, so a second request sees the first one's bytes and fails
//! its offset check. Writers in other processes are caught by re-reading the
//! stored length before every write.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use bytes::Bytes;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use resumable_core::protocol::HEADER_UPLOAD_LENGTH;
use resumable_core::{NumericHeader, UploadComplete, UploadHeaders, UploadSession, UploadToken};
use resumable_metadata::MetadataStore;
use resumable_metadata::models::UploadSessionRow;
use resumable_metadata::repos::UploadRepo;
use resumable_storage::{BlobAppender, ByteStore, StorageError};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Request body as a stream of byte frames.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Whether an append is the first write of a creation request or a later,
/// independent request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendPhase {
    Creation,
    Continuation,
}

/// Result of a successful append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendReceipt {
    pub token: UploadToken,
    /// Durable length after this call.
    pub offset: u64,
    /// Whether this call carried `Upload-Complete: 1`.
    pub complete: bool,
    /// Whether this call created the session (a `Location` is due).
    pub created: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended(AppendReceipt),
    /// The session was already complete; nothing was read or written.
    AlreadyComplete { offset: u64 },
}

/// Snapshot returned by a status request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadStatus {
    pub complete: bool,
    pub offset: u64,
    pub length: Option<u64>,
}

/// The resumable upload protocol engine.
#[derive(Clone)]
pub struct UploadEngine {
    storage: Arc<dyn ByteStore>,
    metadata: Arc<dyn MetadataStore>,
    copy_chunk_size: usize,
    locks: Arc<DashMap<UploadToken, Arc<Mutex<()>>>>,
}

/// Exclusive hold on one session for the length of a request.
struct SessionGuard {
    locks: Arc<DashMap<UploadToken, Arc<Mutex<()>>>>,
    token: UploadToken,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Forget the lock once nobody is queued on it.
        self.locks.remove_if(&self.token, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl UploadEngine {
    pub fn new(
        storage: Arc<dyn ByteStore>,
        metadata: Arc<dyn MetadataStore>,
        copy_chunk_size: usize,
    ) -> Self {
        Self {
            storage,
            metadata,
            copy_chunk_size: copy_chunk_size.max(1),
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Create a session and write the request body as its first chunk.
    #[tracing::instrument(skip(self, owner, headers, body), fields(owner = owner.unwrap_or("-")))]
    pub async fn create(
        &self,
        owner: Option<&str>,
        headers: &UploadHeaders,
        body: BodyStream,
    ) -> ApiResult<AppendOutcome> {
        let owner = gate(owner, headers)?;

        if !headers.complete.is_present() {
            return Err(ApiError::malformed("Upload-Complete header is required"));
        }

        let upload_length = numeric(&headers.upload_length, HEADER_UPLOAD_LENGTH)?;
        let content_length = numeric(&headers.content_length, "content-length")?;
        let complete = headers.complete.is_true();

        if complete
            && let (Some(declared), Some(actual)) = (upload_length, content_length)
            && declared != actual
        {
            return Err(ApiError::malformed(format!(
                "Upload-Length {declared} does not match Content-Length {actual}"
            )));
        }

        let declared_size = match upload_length {
            Some(len) => Some(len),
            None if complete => content_length,
            None => None,
        };
        if let Some(size) = declared_size
            && i64::try_from(size).is_err()
        {
            return Err(ApiError::malformed(format!(
                "declared length {size} is too large"
            )));
        }

        let session = UploadSession::new(owner, declared_size);
        let row = UploadSessionRow::from_session(&session)?;

        // An empty blob makes the durable length queryable from the start.
        self.storage
            .append(&session.storage_path, Bytes::new())
            .await?;
        if let Err(e) = self.metadata.create_session(&row).await {
            if let Err(cleanup) = self.storage.delete(&session.storage_path).await {
                tracing::warn!(
                    storage_path = %session.storage_path,
                    error = %cleanup,
                    "Failed to remove blob for unpersisted session"
                );
            }
            return Err(e.into());
        }

        metrics::UPLOAD_SESSIONS_CREATED.inc();
        tracing::info!(
            token = %session.token,
            declared_size = ?declared_size,
            "Created upload session"
        );

        self.append(
            &session.token.to_string(),
            Some(owner),
            headers,
            body,
            AppendPhase::Creation,
        )
        .await
    }

    /// Append the request body to an existing session.
    #[tracing::instrument(skip(self, owner, headers, body), fields(owner = owner.unwrap_or("-")))]
    pub async fn append(
        &self,
        token: &str,
        owner: Option<&str>,
        headers: &UploadHeaders,
        body: BodyStream,
        phase: AppendPhase,
    ) -> ApiResult<AppendOutcome> {
        let _timer = metrics::APPEND_DURATION.start_timer();
        let owner = gate(owner, headers)?;

        match phase {
            AppendPhase::Creation if !headers.complete.is_present() => {
                return Err(ApiError::malformed("Upload-Complete header is required"));
            }
            AppendPhase::Continuation if !headers.is_partial_upload() => {
                return Err(ApiError::malformed(
                    "Content-Type must be application/partial-upload",
                ));
            }
            _ => {}
        }

        let token = parse_token(token)?;
        let _guard = self.lock_session(token).await;
        let mut session = self.find_session(owner, &token).await?;
        let current = self.storage.length(&session.storage_path).await?;

        if session.complete {
            tracing::debug!(token = %session.token, offset = current, "Upload already complete");
            return Ok(AppendOutcome::AlreadyComplete { offset: current });
        }

        if phase == AppendPhase::Continuation {
            let provided = match headers.upload_offset {
                NumericHeader::Malformed => {
                    return Err(ApiError::MalformedRequest {
                        reason: "Upload-Offset is not a non-negative integer".to_string(),
                        offset: Some(current),
                    });
                }
                NumericHeader::Value(v) => Some(v),
                NumericHeader::Absent => None,
            };
            if provided != Some(current) {
                metrics::OFFSET_CONFLICTS.inc();
                tracing::warn!(
                    token = %session.token,
                    expected = current,
                    provided = ?provided,
                    "Upload offset mismatch"
                );
                return Err(ApiError::OffsetConflict {
                    expected: current,
                    provided,
                });
            }
        }

        let written = self
            .copy_body(&session.storage_path, body, current, session.declared_size)
            .await?;
        let offset = self.storage.length(&session.storage_path).await?;
        tracing::debug!(token = %session.token, written, offset, "Appended chunk");

        let complete = headers.complete == UploadComplete::True;
        if complete {
            session.mark_complete(offset);
            self.metadata
                .update_session(&UploadSessionRow::from_session(&session)?)
                .await?;
            metrics::UPLOAD_SESSIONS_COMPLETED.inc();
            tracing::info!(token = %session.token, length = offset, "Upload completed");

            if !session.is_length_consistent(offset) {
                return Err(ApiError::MalformedRequest {
                    reason: format!(
                        "received {offset} bytes but upload length is {}",
                        session.declared_size.unwrap_or_default()
                    ),
                    offset: Some(offset),
                });
            }
        }

        Ok(AppendOutcome::Appended(AppendReceipt {
            token: session.token,
            offset,
            complete,
            created: phase == AppendPhase::Creation,
        }))
    }

    /// Report a session's progress. Write-only headers are rejected.
    #[tracing::instrument(skip(self, owner, headers), fields(owner = owner.unwrap_or("-")))]
    pub async fn status(
        &self,
        token: &str,
        owner: Option<&str>,
        headers: &UploadHeaders,
    ) -> ApiResult<UploadStatus> {
        let owner = gate(owner, headers)?;

        if headers.upload_offset.is_present()
            || headers.complete.is_present()
            || headers.upload_length.is_present()
        {
            return Err(ApiError::malformed(
                "status requests must not carry Upload-Offset, Upload-Complete or Upload-Length",
            ));
        }

        let session = self.find_session(owner, &parse_token(token)?).await?;
        let offset = self.storage.length(&session.storage_path).await?;

        Ok(UploadStatus {
            complete: session.complete,
            offset,
            length: session.declared_size,
        })
    }

    /// Delete a session and its bytes.
    ///
    /// Bytes go first, then the record. A crash in between leaves a record
    /// whose storage lookups fail rather than bytes nobody can reach; the
    /// opposite order would leak orphaned blobs instead.
    #[tracing::instrument(skip(self, owner, headers), fields(owner = owner.unwrap_or("-")))]
    pub async fn delete(
        &self,
        token: &str,
        owner: Option<&str>,
        headers: &UploadHeaders,
    ) -> ApiResult<()> {
        let owner = gate(owner, headers)?;

        if headers.upload_offset.is_present() || headers.complete.is_present() {
            return Err(ApiError::malformed(
                "delete requests must not carry Upload-Offset or Upload-Complete",
            ));
        }

        let token = parse_token(token)?;
        let _guard = self.lock_session(token).await;
        let session = self.find_session(owner, &token).await?;

        match self.storage.delete(&session.storage_path).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.metadata
            .delete_session(owner, &session.token.to_string())
            .await?;

        metrics::UPLOAD_SESSIONS_DELETED.inc();
        tracing::info!(token = %session.token, "Deleted upload session");
        Ok(())
    }

    async fn lock_session(&self, token: UploadToken) -> SessionGuard {
        let lock = self.locks.entry(token).or_default().clone();
        SessionGuard {
            locks: self.locks.clone(),
            token,
            guard: Some(lock.lock_owned().await),
        }
    }

    async fn find_session(&self, owner: &str, token: &UploadToken) -> ApiResult<UploadSession> {
        let row = self
            .metadata
            .find_session(owner, &token.to_string())
            .await?
            .ok_or_else(session_not_found)?;
        Ok(UploadSession::try_from(row)?)
    }

    /// Copy the body into the blob through one appender, syncing once at the end.
    ///
    /// Whatever was written stays durable when the copy stops early.
    async fn copy_body(
        &self,
        key: &str,
        body: BodyStream,
        start: u64,
        limit: Option<u64>,
    ) -> ApiResult<u64> {
        let mut appender = self.storage.open_appender(key).await?;
        let copied = self.copy_frames(key, body, appender.as_mut(), start, limit).await;
        let synced = appender.sync().await;
        let written = copied?;
        synced?;
        Ok(written)
    }

    /// Write body frames, re-reading the stored length before every write.
    ///
    /// A length that moved under us means another writer got in and the copy
    /// stops with a conflict. With a `limit`, frames are split into increments
    /// of at most `copy_chunk_size` and an increment that would carry the blob
    /// past the limit is refused before it is written.
    async fn copy_frames(
        &self,
        key: &str,
        mut body: BodyStream,
        appender: &mut dyn BlobAppender,
        start: u64,
        limit: Option<u64>,
    ) -> ApiResult<u64> {
        let increment_size = if limit.is_some() {
            self.copy_chunk_size
        } else {
            usize::MAX
        };
        let mut position = start;

        while let Some(frame) = body.next().await {
            let mut frame = frame
                .map_err(|e| ApiError::Internal(format!("failed to read request body: {e}")))?;

            while !frame.is_empty() {
                let increment = frame.split_to(frame.len().min(increment_size));
                let len = increment.len() as u64;

                let durable = self.storage.length(key).await?;
                if durable != position {
                    metrics::OFFSET_CONFLICTS.inc();
                    tracing::warn!(key, expected = position, durable, "Blob moved during append");
                    return Err(ApiError::OffsetConflict {
                        expected: durable,
                        provided: Some(position),
                    });
                }

                let end = durable
                    .checked_add(len)
                    .ok_or_else(|| ApiError::malformed("upload offset overflow"))?;
                if let Some(limit) = limit
                    && end > limit
                {
                    return Err(ApiError::MalformedRequest {
                        reason: format!("upload would exceed declared length of {limit} bytes"),
                        offset: Some(durable),
                    });
                }

                appender.write(increment).await?;
                position = end;
                metrics::BYTES_APPENDED.inc_by(len);
            }
        }

        Ok(position - start)
    }
}

fn session_not_found() -> ApiError {
    ApiError::NotFound("upload session not found".to_string())
}

fn parse_token(token: &str) -> ApiResult<UploadToken> {
    UploadToken::parse(token).map_err(|_| session_not_found())
}

/// Identity first, then protocol version.
fn gate<'a>(owner: Option<&'a str>, headers: &UploadHeaders) -> ApiResult<&'a str> {
    let owner = owner.ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))?;
    if !headers.is_supported_version() {
        return Err(ApiError::VersionUnsupported);
    }
    Ok(owner)
}

fn numeric(header: &NumericHeader, name: &'static str) -> ApiResult<Option<u64>> {
    header.value(name).map_err(|e| ApiError::malformed(e.to_string()))
}
