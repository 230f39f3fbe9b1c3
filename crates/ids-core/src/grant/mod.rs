//! Grant Store
//!
//! Authorization codes, refresh tokens and remembered consent, keyed by the
//! hash of the handle given to the client.

pub mod cleanup;
pub mod entity;
pub mod memory;
pub mod mongo;
pub mod repository;

pub use cleanup::{CleanupConfig, GrantCleanupTask};
pub use entity::{Grant, GrantKind};
pub use memory::InMemoryGrantStore;
pub use mongo::MongoGrantStore;
pub use repository::GrantStore;
