//! Resumable upload endpoints.
//!
//! These handlers only translate between HTTP and [`UploadEngine`] calls;
//! every protocol decision is made by the engine.
//!
//! [`UploadEngine`]: crate::engine::UploadEngine

use crate::auth::get_auth;
use crate::engine::{AppendOutcome, AppendPhase, BodyStream, UploadStatus};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use resumable_core::protocol::{
    HEADER_UPLOAD_COMPLETE, HEADER_UPLOAD_LENGTH, HEADER_UPLOAD_OFFSET,
};
use resumable_core::{TokenScope, UploadComplete, UploadHeaders};

/// POST|PUT|PATCH /upload - Create an upload session.
pub async fn create_upload(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let owner = upload_owner(&req)?;
    let (parts, body) = req.into_parts();
    let headers = upload_headers(&parts.headers);

    let outcome = state
        .engine
        .create(owner.as_deref(), &headers, body_stream(body))
        .await?;
    append_response(&state, outcome)
}

/// PATCH /upload/{token} - Append to an upload session.
pub async fn append_upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
    req: Request,
) -> ApiResult<Response> {
    let owner = upload_owner(&req)?;
    let (parts, body) = req.into_parts();
    let headers = upload_headers(&parts.headers);

    let outcome = state
        .engine
        .append(
            &token,
            owner.as_deref(),
            &headers,
            body_stream(body),
            AppendPhase::Continuation,
        )
        .await?;
    append_response(&state, outcome)
}

/// GET|HEAD /upload/{token} - Report upload progress.
pub async fn get_upload_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
    req: Request,
) -> ApiResult<Response> {
    let owner = upload_owner(&req)?;
    let headers = upload_headers(req.headers());

    let status = state
        .engine
        .status(&token, owner.as_deref(), &headers)
        .await?;
    Ok(status_response(status))
}

/// DELETE /upload/{token} - Cancel an upload and discard its bytes.
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let owner = upload_owner(&req)?;
    let headers = upload_headers(req.headers());

    state
        .engine
        .delete(&token, owner.as_deref(), &headers)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Caller identity for upload calls. Anonymous callers are left to the engine.
fn upload_owner(req: &Request) -> ApiResult<Option<String>> {
    match get_auth(req) {
        Some(user) => {
            user.require_scope(TokenScope::UploadWrite)?;
            Ok(Some(user.owner_id().to_string()))
        }
        None => Ok(None),
    }
}

fn upload_headers(headers: &HeaderMap) -> UploadHeaders {
    UploadHeaders::from_lookup(|name| headers.get(name).and_then(|v| v.to_str().ok()))
}

fn body_stream(body: Body) -> BodyStream {
    Box::pin(body.into_data_stream().map_err(std::io::Error::other))
}

fn append_response(state: &AppState, outcome: AppendOutcome) -> ApiResult<Response> {
    let receipt = match outcome {
        AppendOutcome::Appended(receipt) => receipt,
        AppendOutcome::AlreadyComplete { offset } => {
            return Err(ApiError::UploadCompleted { offset });
        }
    };

    let mut response = StatusCode::CREATED.into_response();
    let headers = response.headers_mut();
    headers.insert(HEADER_UPLOAD_OFFSET, HeaderValue::from(receipt.offset));
    headers.insert(
        HEADER_UPLOAD_COMPLETE,
        HeaderValue::from_static(UploadComplete::as_header_value(receipt.complete)),
    );
    if receipt.created {
        let location = state.upload_location(&receipt.token);
        let location = HeaderValue::from_str(&location)
            .map_err(|e| ApiError::Internal(format!("invalid upload location: {e}")))?;
        headers.insert(header::LOCATION, location);
    }
    Ok(response)
}

fn status_response(status: UploadStatus) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        HEADER_UPLOAD_COMPLETE,
        HeaderValue::from_static(UploadComplete::as_header_value(status.complete)),
    );
    headers.insert(HEADER_UPLOAD_OFFSET, HeaderValue::from(status.offset));
    if let Some(length) = status.length {
        headers.insert(HEADER_UPLOAD_LENGTH, HeaderValue::from(length));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_headers() {
        let response = status_response(UploadStatus {
            complete: false,
            offset: 6,
            length: None,
        });
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(response.headers()[HEADER_UPLOAD_COMPLETE], "0");
        assert_eq!(response.headers()[HEADER_UPLOAD_OFFSET], "6");
        assert!(response.headers().get(HEADER_UPLOAD_LENGTH).is_none());
    }

    #[test]
    fn test_upload_headers_lookup() {
        let mut map = HeaderMap::new();
        map.insert(HEADER_UPLOAD_OFFSET, HeaderValue::from_static("12"));
        map.insert(HEADER_UPLOAD_COMPLETE, HeaderValue::from_static("1"));

        let headers = upload_headers(&map);
        assert_eq!(headers.upload_offset.value(HEADER_UPLOAD_OFFSET).unwrap(), Some(12));
        assert!(headers.complete.is_true());
        assert!(!headers.is_supported_version());
    }
}
