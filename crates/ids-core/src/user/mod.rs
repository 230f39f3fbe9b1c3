//! Credential Store
//!
//! Users, password verification and the time-based second factor.

pub mod credential_service;
pub mod entity;
pub mod memory;
pub mod mongo;
pub mod password_service;
pub mod repository;
pub mod totp;

pub use credential_service::CredentialService;
pub use entity::{ExternalLogin, User};
pub use memory::InMemoryUserStore;
pub use mongo::MongoUserStore;
pub use password_service::{Argon2Config, PasswordService};
pub use repository::UserStore;
pub use totp::Totp;
