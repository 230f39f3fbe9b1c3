//! Registry store abstractions.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::entity::Client;
use super::resources::{ApiResource, IdentityResource, Resources};
use crate::shared::store::StoreResult;

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Enabled client by its public identifier
    async fn find_enabled_client(&self, client_id: &str) -> StoreResult<Option<Client>>;

    /// Fails with `StoreError::Conflict` when the client id is taken.
    async fn insert(&self, client: &Client) -> StoreResult<()>;

    /// Administrative changes such as secret rotation
    async fn update(&self, client: &Client) -> StoreResult<()>;
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Enabled identity resources named by, and API resources exposing any
    /// of, the given scopes
    async fn find_resources_by_scopes(&self, scopes: &BTreeSet<String>) -> StoreResult<Resources>;

    async fn insert_identity_resource(&self, resource: &IdentityResource) -> StoreResult<()>;

    async fn insert_api_resource(&self, resource: &ApiResource) -> StoreResult<()>;
}
