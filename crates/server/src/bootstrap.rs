//! Startup registration of the operator's admin token.

use crate::credentials::{self, Grant};
use anyhow::{Context, Result, bail};
use resumable_core::config::AdminConfig;
use resumable_core::token::TokenScope;
use resumable_metadata::MetadataStore;
use resumable_metadata::repos::{BootstrapRepo, TokenRepo};
use time::OffsetDateTime;

/// Owner of the admin token when `admin.token_owner` is unset.
pub const DEFAULT_ADMIN_OWNER: &str = "admin";

/// Make `config.token_hash` the one live bootstrap token.
///
/// A hash seen before is reused as long as that token is still usable. A new
/// hash is registered first and only then is the previous bootstrap token
/// revoked, so a rejected configuration never locks the operator out.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    let hash = credentials::normalize_hash(&config.token_hash)
        .context("invalid admin token_hash: expected 64 hex chars, optionally sha256: prefixed")?;

    if let Some(existing) = metadata.get_token_by_hash(&hash).await? {
        let now = OffsetDateTime::now_utc();
        let expired = existing.expires_at.is_some_and(|at| at <= now);
        if existing.revoked_at.is_some() || expired {
            bail!(
                "admin token_hash belongs to token {} which is revoked or expired; \
                 configure a new secret",
                existing.token_id
            );
        }
        metadata.set_bootstrap_token_id(existing.token_id).await?;
        tracing::debug!(token_id = %existing.token_id, "Admin token already registered");
        return Ok(());
    }

    let scopes = config
        .token_scopes
        .clone()
        .unwrap_or_else(|| vec![TokenScope::Admin.as_str().to_string()]);
    let owner = config.token_owner.as_deref().unwrap_or(DEFAULT_ADMIN_OWNER);
    let grant = Grant::new(owner, &scopes)
        .context("invalid admin token configuration")?
        .described(config.token_description.clone());

    let previous = metadata.get_bootstrap_token_id().await?;
    let token_id = credentials::register_hash(metadata, grant, &hash)
        .await
        .context("failed to register admin token")?;
    metadata.set_bootstrap_token_id(*token_id.as_uuid()).await?;
    tracing::info!(token_id = %token_id, owner_id = owner, "Admin token registered");

    if let Some(previous) = previous {
        metadata
            .revoke_token(previous, OffsetDateTime::now_utc())
            .await?;
        tracing::info!(token_id = %previous, "Previous admin token revoked");
    }

    Ok(())
}
