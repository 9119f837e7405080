//! HTTP request handlers.

pub mod admin;
pub mod health;
pub mod uploads;

pub use admin::*;
pub use health::*;
pub use uploads::*;
