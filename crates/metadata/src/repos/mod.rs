//! Repository traits for metadata operations.

pub mod bootstrap;
pub mod tokens;
pub mod uploads;

pub use bootstrap::BootstrapRepo;
pub use tokens::TokenRepo;
pub use uploads::UploadRepo;
