//! Token administration.

use crate::auth::require_auth;
use crate::credentials::{self, Grant};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use resumable_core::token::{TokenId, TokenScope};
use resumable_metadata::repos::TokenRepo;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Token requests are tiny; anything larger is refused unread.
const MAX_MINT_BODY_SIZE: usize = 64 * 1024;

/// Body of `POST /v1/admin/tokens`.
#[derive(Debug, Deserialize)]
pub struct MintTokenRequest {
    /// Identity every upload made with the token is filed under.
    pub owner_id: String,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MintTokenResponse {
    pub token_id: String,
    pub token_secret: String,
    pub owner_id: String,
    pub scopes: Vec<&'static str>,
    pub expires_at: Option<String>,
}

/// POST /v1/admin/tokens
pub async fn create_token(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<MintTokenResponse>)> {
    let minted_by = {
        let auth = require_auth(&req)?;
        auth.require_scope(TokenScope::Admin)?;
        auth.token.id
    };

    let bytes = axum::body::to_bytes(req.into_body(), MAX_MINT_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let request: MintTokenRequest = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::BadRequest(format!("invalid token request: {e}")))?;

    let grant = Grant::new(&request.owner_id, &request.scopes)?
        .expiring(OffsetDateTime::now_utc(), request.expires_in_secs)?
        .described(request.description);
    let scopes = grant.scopes().iter().map(TokenScope::as_str).collect();

    let issued = credentials::issue(state.metadata.as_ref(), grant).await?;
    tracing::info!(
        token_id = %issued.token_id,
        owner_id = %issued.owner_id,
        minted_by = %minted_by,
        "Minted caller token"
    );

    let expires_at = issued
        .expires_at
        .map(|t| t.format(&Rfc3339))
        .transpose()
        .map_err(|e| ApiError::Internal(format!("failed to format expires_at: {e}")))?;

    Ok((
        StatusCode::CREATED,
        Json(MintTokenResponse {
            token_id: issued.token_id.to_string(),
            token_secret: issued.secret,
            owner_id: issued.owner_id,
            scopes,
            expires_at,
        }),
    ))
}

/// DELETE /v1/admin/tokens/{token_id}
///
/// Revoking an already revoked token succeeds and keeps the first revocation time.
pub async fn revoke_token(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let revoked_by = {
        let auth = require_auth(&req)?;
        auth.require_scope(TokenScope::Admin)?;
        auth.token.id
    };

    let token_id = TokenId::parse(&token_id)?;
    state
        .metadata
        .revoke_token(*token_id.as_uuid(), OffsetDateTime::now_utc())
        .await?;
    tracing::info!(token_id = %token_id, revoked_by = %revoked_by, "Revoked caller token");

    Ok(StatusCode::NO_CONTENT)
}
