//! In-memory client and resource registry.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};

use super::entity::Client;
use super::repository::{ClientStore, ResourceStore};
use super::resources::{ApiResource, IdentityResource, Resources};
use super::scope::OFFLINE_ACCESS;
use crate::shared::store::{StoreError, StoreResult};

#[derive(Default)]
pub struct InMemoryRegistry {
    clients: DashMap<String, Client>,
    identity_resources: DashMap<String, IdentityResource>,
    api_resources: DashMap<String, ApiResource>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryRegistry {
    async fn find_enabled_client(&self, client_id: &str) -> StoreResult<Option<Client>> {
        Ok(self
            .clients
            .get(client_id)
            .filter(|c| c.enabled)
            .map(|c| c.clone()))
    }

    async fn insert(&self, client: &Client) -> StoreResult<()> {
        match self.clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!("client {}", client.client_id))),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, client: &Client) -> StoreResult<()> {
        match self.clients.get_mut(&client.client_id) {
            Some(mut existing) => {
                *existing = client.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::Backend(format!("client {} not found", client.client_id))),
        }
    }
}

#[async_trait]
impl ResourceStore for InMemoryRegistry {
    async fn find_resources_by_scopes(&self, scopes: &BTreeSet<String>) -> StoreResult<Resources> {
        let identity = self
            .identity_resources
            .iter()
            .filter(|r| r.enabled && scopes.contains(&r.name))
            .map(|r| r.clone())
            .collect();
        let apis = self
            .api_resources
            .iter()
            .filter(|r| r.enabled && r.scopes.iter().any(|s| scopes.contains(s)))
            .map(|r| r.clone())
            .collect();

        Ok(Resources {
            identity,
            apis,
            offline_access: scopes.contains(OFFLINE_ACCESS),
        })
    }

    async fn insert_identity_resource(&self, resource: &IdentityResource) -> StoreResult<()> {
        self.identity_resources.insert(resource.name.clone(), resource.clone());
        Ok(())
    }

    async fn insert_api_resource(&self, resource: &ApiResource) -> StoreResult<()> {
        self.api_resources.insert(resource.name.clone(), resource.clone());
        Ok(())
    }
}
