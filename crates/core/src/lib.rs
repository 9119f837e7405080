//! Core domain types for the resumable upload server.
//!
//! This crate defines the data model shared by all other crates:
//! - Upload tokens and session lifecycle
//! - The resumable-upload header vocabulary and typed header values
//! - Caller tokens and scopes
//! - Configuration

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod token;

pub use error::{Error, Result};
pub use protocol::{NumericHeader, UploadComplete, UploadHeaders};
pub use session::{UploadSession, UploadToken};
pub use token::{Token, TokenId, TokenScope};

/// Default size of a single body copy increment: 16 KiB
pub const DEFAULT_COPY_CHUNK_SIZE: usize = 16 * 1024;

/// Maximum size of a single body copy increment: 16 MiB
pub const MAX_COPY_CHUNK_SIZE: usize = 16 * 1024 * 1024;
