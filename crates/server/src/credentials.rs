//! Issuing caller credentials.
//!
//! Tokens reach the token table only through a [`Grant`]: an owner that
//! every upload made with the token is filed under, plus a validated scope
//! set. The admin API mints a random secret for a grant; bootstrap registers
//! a grant under a hash whose secret the operator already holds.

use crate::auth::hash_token;
use crate::error::{ApiError, ApiResult};
use base64::Engine;
use rand::RngCore;
use resumable_core::token::{TokenId, TokenScope};
use resumable_metadata::MetadataStore;
use resumable_metadata::models::TokenRow;
use resumable_metadata::repos::TokenRepo;
use time::{Duration, OffsetDateTime};

/// Random bytes behind each minted secret.
const SECRET_BYTES: usize = 32;

/// What a token may do and on whose behalf.
#[derive(Clone, Debug)]
pub struct Grant {
    owner_id: String,
    scopes: Vec<TokenScope>,
    expires_at: Option<OffsetDateTime>,
    description: Option<String>,
}

impl Grant {
    /// Validate an owner and a list of scope names.
    pub fn new(owner_id: &str, scopes: &[String]) -> ApiResult<Self> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(ApiError::BadRequest("owner_id must not be empty".to_string()));
        }
        if scopes.is_empty() {
            return Err(ApiError::BadRequest("at least one scope is required".to_string()));
        }

        let mut parsed = Vec::with_capacity(scopes.len());
        for name in scopes {
            let scope = TokenScope::parse(name)
                .map_err(|_| ApiError::BadRequest(format!("invalid scope: {name}")))?;
            if !parsed.contains(&scope) {
                parsed.push(scope);
            }
        }

        Ok(Self {
            owner_id: owner_id.to_string(),
            scopes: parsed,
            expires_at: None,
            description: None,
        })
    }

    /// Expire the grant `secs` seconds after `now`.
    pub fn expiring(mut self, now: OffsetDateTime, secs: Option<u64>) -> ApiResult<Self> {
        self.expires_at = match secs {
            None => None,
            Some(secs) => {
                let secs = i64::try_from(secs).map_err(|_| {
                    ApiError::BadRequest(format!("expires_in_secs too large: {secs}"))
                })?;
                let expires_at = now.checked_add(Duration::seconds(secs)).ok_or_else(|| {
                    ApiError::BadRequest("expires_in_secs out of range".to_string())
                })?;
                Some(expires_at)
            }
        };
        Ok(self)
    }

    pub fn described(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn scopes(&self) -> &[TokenScope] {
        &self.scopes
    }

    fn into_row(self, token_hash: String, now: OffsetDateTime) -> ApiResult<TokenRow> {
        let names: Vec<&str> = self.scopes.iter().map(TokenScope::as_str).collect();
        let scopes = serde_json::to_string(&names)
            .map_err(|e| ApiError::Internal(format!("failed to serialize scopes: {e}")))?;

        Ok(TokenRow {
            token_id: *TokenId::new().as_uuid(),
            owner_id: self.owner_id,
            token_hash,
            scopes,
            expires_at: self.expires_at,
            revoked_at: None,
            created_at: now,
            last_used_at: None,
            description: self.description,
        })
    }
}

/// A freshly minted token. `secret` is never stored and cannot be recovered.
#[derive(Debug)]
pub struct IssuedToken {
    pub token_id: TokenId,
    pub secret: String,
    pub owner_id: String,
    pub expires_at: Option<OffsetDateTime>,
}

/// Mint a random secret for `grant` and store its hash.
pub async fn issue(metadata: &dyn MetadataStore, grant: Grant) -> ApiResult<IssuedToken> {
    let secret = generate_secret();
    let row = grant.into_row(hash_token(&secret), OffsetDateTime::now_utc())?;
    metadata.create_token(&row).await?;

    Ok(IssuedToken {
        token_id: TokenId::from(row.token_id),
        secret,
        owner_id: row.owner_id,
        expires_at: row.expires_at,
    })
}

/// Store `grant` under an operator-supplied secret hash.
pub async fn register_hash(
    metadata: &dyn MetadataStore,
    grant: Grant,
    token_hash: &str,
) -> ApiResult<TokenId> {
    let row = grant.into_row(token_hash.to_string(), OffsetDateTime::now_utc())?;
    metadata.create_token(&row).await?;
    Ok(TokenId::from(row.token_id))
}

/// Normalize a configured secret hash to the form [`hash_token`] produces.
///
/// Accepts an optional `sha256:` prefix and either hex case.
pub fn normalize_hash(configured: &str) -> Option<String> {
    let hex = configured.strip_prefix("sha256:").unwrap_or(configured);
    (hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())).then(|| hex.to_lowercase())
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(scopes: &[&str]) -> Vec<String> {
        scopes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_grant_validation() {
        assert!(Grant::new("alice", &[]).is_err());
        assert!(Grant::new("  ", &names(&["upload:write"])).is_err());
        assert!(Grant::new("alice", &names(&["cache:admin"])).is_err());

        let grant = Grant::new(" alice ", &names(&["upload:write", "upload:write"])).unwrap();
        assert_eq!(grant.owner_id(), "alice");
        assert_eq!(grant.scopes(), &[TokenScope::UploadWrite]);
    }

    #[test]
    fn test_grant_expiry() {
        let now = OffsetDateTime::now_utc();
        let grant = Grant::new("alice", &names(&["admin"])).unwrap();

        let expiring = grant.clone().expiring(now, Some(60)).unwrap();
        assert_eq!(expiring.expires_at, Some(now + Duration::seconds(60)));
        assert!(grant.clone().expiring(now, None).unwrap().expires_at.is_none());
        assert!(grant.expiring(now, Some(u64::MAX)).is_err());
    }

    #[test]
    fn test_row_stores_canonical_scope_names() {
        let now = OffsetDateTime::now_utc();
        let row = Grant::new("alice", &names(&["admin", "upload:write"]))
            .unwrap()
            .described(Some("ci".to_string()))
            .into_row("ab".repeat(32), now)
            .unwrap();

        assert_eq!(row.owner_id, "alice");
        assert_eq!(row.scopes, r#"["admin","upload:write"]"#);
        assert_eq!(row.description.as_deref(), Some("ci"));
        assert!(row.revoked_at.is_none());
    }

    #[test]
    fn test_normalize_hash() {
        let hex = "AB".repeat(32);
        assert_eq!(normalize_hash(&hex), Some("ab".repeat(32)));
        assert_eq!(normalize_hash(&format!("sha256:{hex}")), Some("ab".repeat(32)));
        assert_eq!(normalize_hash("not-hex"), None);
        assert_eq!(normalize_hash(&"zz".repeat(32)), None);
    }

    #[test]
    fn test_secrets_are_unique_and_url_safe() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        // 32 bytes, unpadded base64.
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
