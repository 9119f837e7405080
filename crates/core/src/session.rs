//! Upload tokens and session lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Opaque identifier for an upload session.
///
/// Backed by a random UUID v4 and rendered as 32 lower-case hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadToken(Uuid);

impl UploadToken {
    /// Generate a new random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string (simple or hyphenated form).
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::try_parse(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidToken(format!("invalid upload token: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Key under which the session's bytes are stored.
    pub fn storage_path(&self) -> String {
        format!("uploads/{}", self.0.simple())
    }
}

impl fmt::Debug for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadToken({})", self.0.simple())
    }
}

impl fmt::Display for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// A resumable upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Lookup key, together with `owner_id`.
    pub token: UploadToken,
    /// Identity of the caller that created the session.
    pub owner_id: String,
    /// Byte store key where appended data accumulates. Never changes.
    pub storage_path: String,
    /// Total length the upload will reach, once known. Immutable after it is set.
    pub declared_size: Option<u64>,
    /// Set exactly once, when the final chunk is durably appended.
    pub complete: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UploadSession {
    /// Create a new, incomplete session with a fresh token.
    pub fn new(owner_id: impl Into<String>, declared_size: Option<u64>) -> Self {
        let token = UploadToken::generate();
        let now = OffsetDateTime::now_utc();
        Self {
            storage_path: token.storage_path(),
            token,
            owner_id: owner_id.into(),
            declared_size,
            complete: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the upload complete at `final_length` bytes.
    ///
    /// A declared size that is already known is left untouched, so the caller
    /// must compare it against `final_length` afterwards.
    pub fn mark_complete(&mut self, final_length: u64) {
        self.complete = true;
        if self.declared_size.is_none() {
            self.declared_size = Some(final_length);
        }
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Whether `length` durable bytes match the declared size.
    pub fn is_length_consistent(&self, length: u64) -> bool {
        self.declared_size == Some(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip_formats() {
        let token = UploadToken::generate();
        let simple = token.to_string();
        assert_eq!(simple.len(), 32);
        assert!(simple.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        assert_eq!(UploadToken::parse(&simple).unwrap(), token);
        assert_eq!(
            UploadToken::parse(&token.as_uuid().hyphenated().to_string()).unwrap(),
            token
        );
        assert!(UploadToken::parse("not-a-token").is_err());
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens: std::collections::HashSet<_> =
            (0..1000).map(|_| UploadToken::generate()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_new_session() {
        let session = UploadSession::new("alice", Some(10));
        assert_eq!(session.owner_id, "alice");
        assert_eq!(session.declared_size, Some(10));
        assert!(!session.complete);
        assert_eq!(session.storage_path, format!("uploads/{}", session.token));
    }

    #[test]
    fn test_mark_complete_infers_size() {
        let mut session = UploadSession::new("alice", None);
        session.mark_complete(150);
        assert!(session.complete);
        assert_eq!(session.declared_size, Some(150));
        assert!(session.is_length_consistent(150));
    }

    #[test]
    fn test_mark_complete_keeps_declared_size() {
        let mut session = UploadSession::new("alice", Some(10));
        session.mark_complete(9);
        assert!(session.complete);
        assert_eq!(session.declared_size, Some(10));
        assert!(!session.is_length_consistent(9));
    }

    #[test]
    fn test_session_serialization() {
        let session = UploadSession::new("bob", None);
        let json = serde_json::to_string(&session).unwrap();
        let back: UploadSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.token, session.token);
        assert_eq!(back.owner_id, "bob");
    }
}
