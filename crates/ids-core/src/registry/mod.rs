//! Client/Scope Registry
//!
//! Registered clients and the identity and API resources their scopes name.

pub mod entity;
pub mod memory;
pub mod mongo;
pub mod repository;
pub mod resources;
pub mod scope;

pub use entity::{Client, ClientSecret, GrantType, RefreshTokenUsage};
pub use memory::InMemoryRegistry;
pub use mongo::{MongoClientStore, MongoResourceStore};
pub use repository::{ClientStore, ResourceStore};
pub use resources::{ApiResource, IdentityResource, Resources};
