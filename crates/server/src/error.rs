//! API error types.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use resumable_core::protocol::{
    HEADER_UPLOAD_OFFSET, PROBLEM_COMPLETED_UPLOAD, PROBLEM_JSON_MEDIA_TYPE,
    PROBLEM_MISMATCHING_OFFSET,
};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unsupported upload draft interop version")]
    VersionUnsupported,

    #[error("malformed request: {reason}")]
    MalformedRequest {
        reason: String,
        /// Durable offset to report back, when known.
        offset: Option<u64>,
    },

    #[error("offset mismatch: expected {expected}, provided {provided:?}")]
    OffsetConflict { expected: u64, provided: Option<u64> },

    #[error("upload is already completed")]
    UploadCompleted { offset: u64 },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] resumable_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] resumable_metadata::MetadataError),

    #[error("core error: {0}")]
    Core(#[from] resumable_core::Error),
}

impl ApiError {
    /// Shorthand for a malformed request with no offset to report.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest {
            reason: reason.into(),
            offset: None,
        }
    }

    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::VersionUnsupported => "version_unsupported",
            Self::MalformedRequest { .. } => "malformed_request",
            Self::OffsetConflict { .. } => "offset_conflict",
            Self::UploadCompleted { .. } => "upload_completed",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::VersionUnsupported => StatusCode::NOT_IMPLEMENTED,
            Self::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
            Self::OffsetConflict { .. } => StatusCode::CONFLICT,
            Self::UploadCompleted { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Byte store failures are never the client's fault, including a
            // blob that vanished under a live session.
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Metadata(e) => match e {
                resumable_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                resumable_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Offset to echo in `Upload-Offset`, if this error carries one.
    fn upload_offset(&self) -> Option<u64> {
        match self {
            Self::MalformedRequest { offset, .. } => *offset,
            Self::OffsetConflict { expected, .. } => Some(*expected),
            Self::UploadCompleted { offset } => Some(*offset),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        crate::metrics::record_api_error(self.code());
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let mut response = match &self {
            Self::OffsetConflict { expected, provided } => problem(
                status,
                serde_json::json!({
                    "type": PROBLEM_MISMATCHING_OFFSET,
                    "title": "offset from request does not match offset of resource",
                    "expected-offset": expected,
                    "provided-offset": provided,
                }),
            ),
            Self::UploadCompleted { .. } => problem(
                status,
                serde_json::json!({
                    "type": PROBLEM_COMPLETED_UPLOAD,
                    "title": "upload is already completed",
                }),
            ),
            _ => {
                let body = ErrorResponse {
                    code: self.code().to_string(),
                    message: self.to_string(),
                };
                (status, Json(body)).into_response()
            }
        };

        if let Some(offset) = self.upload_offset() {
            response
                .headers_mut()
                .insert(HEADER_UPLOAD_OFFSET, HeaderValue::from(offset));
        }
        response
    }
}

/// Build an RFC 9457 problem details response.
fn problem(status: StatusCode, body: serde_json::Value) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PROBLEM_JSON_MEDIA_TYPE),
    );
    response
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_offset_conflict_problem() {
        let response = ApiError::OffsetConflict {
            expected: 100,
            provided: Some(40),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()[HEADER_UPLOAD_OFFSET], "100");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROBLEM_JSON_MEDIA_TYPE
        );
        let body = body_json(response).await;
        assert_eq!(body["type"], PROBLEM_MISMATCHING_OFFSET);
        assert_eq!(body["expected-offset"], 100);
        assert_eq!(body["provided-offset"], 40);
    }

    #[tokio::test]
    async fn test_offset_conflict_without_provided_offset() {
        let response = ApiError::OffsetConflict {
            expected: 3,
            provided: None,
        }
        .into_response();
        let body = body_json(response).await;
        assert!(body["provided-offset"].is_null());
    }

    #[tokio::test]
    async fn test_upload_completed_problem() {
        let response = ApiError::UploadCompleted { offset: 3 }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[HEADER_UPLOAD_OFFSET], "3");
        let body = body_json(response).await;
        assert_eq!(body["type"], PROBLEM_COMPLETED_UPLOAD);
        assert_eq!(body["title"], "upload is already completed");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::VersionUnsupported.status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Storage(resumable_storage::StorageError::NotFound("k".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::malformed("x").status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_malformed_offset_header() {
        let response = ApiError::MalformedRequest {
            reason: "too long".into(),
            offset: Some(9),
        }
        .into_response();
        assert_eq!(response.headers()[HEADER_UPLOAD_OFFSET], "9");
        let response = ApiError::malformed("x").into_response();
        assert!(response.headers().get(HEADER_UPLOAD_OFFSET).is_none());
    }
}
