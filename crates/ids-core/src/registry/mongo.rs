//! MongoDB client and resource registry.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection, Database};

use super::entity::Client;
use super::repository::{ClientStore, ResourceStore};
use super::resources::{ApiResource, IdentityResource, Resources};
use super::scope::OFFLINE_ACCESS;
use crate::shared::store::StoreResult;

pub struct MongoClientStore {
    collection: Collection<Client>,
}

impl MongoClientStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("clients"),
        }
    }
}

#[async_trait]
impl ClientStore for MongoClientStore {
    async fn find_enabled_client(&self, client_id: &str) -> StoreResult<Option<Client>> {
        Ok(self
            .collection
            .find_one(doc! { "clientId": client_id, "enabled": true })
            .await?)
    }

    async fn insert(&self, client: &Client) -> StoreResult<()> {
        self.collection.insert_one(client).await?;
        Ok(())
    }

    async fn update(&self, client: &Client) -> StoreResult<()> {
        let mut client = client.clone();
        client.updated_at = Utc::now();
        self.collection
            .replace_one(doc! { "clientId": &client.client_id }, &client)
            .await?;
        Ok(())
    }
}

pub struct MongoResourceStore {
    identity: Collection<IdentityResource>,
    apis: Collection<ApiResource>,
}

impl MongoResourceStore {
    pub fn new(db: &Database) -> Self {
        Self {
            identity: db.collection("identity_resources"),
            apis: db.collection("api_resources"),
        }
    }
}

#[async_trait]
impl ResourceStore for MongoResourceStore {
    async fn find_resources_by_scopes(&self, scopes: &BTreeSet<String>) -> StoreResult<Resources> {
        let names: Vec<String> = scopes.iter().cloned().collect();

        let identity: Vec<IdentityResource> = self
            .identity
            .find(doc! { "_id": { "$in": names.clone() }, "enabled": true })
            .await?
            .try_collect()
            .await?;
        let apis: Vec<ApiResource> = self
            .apis
            .find(doc! { "scopes": { "$in": names }, "enabled": true })
            .await?
            .try_collect()
            .await?;

        Ok(Resources {
            identity,
            apis,
            offline_access: scopes.contains(OFFLINE_ACCESS),
        })
    }

    async fn insert_identity_resource(&self, resource: &IdentityResource) -> StoreResult<()> {
        self.identity
            .replace_one(doc! { "_id": &resource.name }, resource)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn insert_api_resource(&self, resource: &ApiResource) -> StoreResult<()> {
        self.apis
            .replace_one(doc! { "_id": &resource.name }, resource)
            .upsert(true)
            .await?;
        Ok(())
    }
}
