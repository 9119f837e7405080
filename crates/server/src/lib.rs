//! HTTP server for resumable uploads.
//!
//! This crate provides:
//! - The upload protocol engine (create, append, status, delete)
//! - HTTP routes translating requests into engine calls
//! - Bearer token authentication, token minting and admin bootstrap
//! - Prometheus metrics

pub mod auth;
pub mod bootstrap;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use engine::UploadEngine;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
