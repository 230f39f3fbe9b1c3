//! MongoDB grant store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    Collection, Database,
};

use super::entity::{Grant, GrantKind};
use super::repository::GrantStore;
use crate::shared::store::StoreResult;

pub struct MongoGrantStore {
    collection: Collection<Grant>,
}

impl MongoGrantStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("grants"),
        }
    }
}

fn bson_time(at: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_chrono(at)
}

#[async_trait]
impl GrantStore for MongoGrantStore {
    async fn store(&self, grant: &Grant) -> StoreResult<()> {
        if grant.kind == GrantKind::UserConsent {
            self.collection
                .replace_one(doc! { "_id": &grant.key }, grant)
                .upsert(true)
                .await?;
        } else {
            self.collection.insert_one(grant).await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Grant>> {
        Ok(self.collection.find_one(doc! { "_id": key }).await?)
    }

    async fn try_consume(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let now = bson_time(now);
        let result = self
            .collection
            .update_one(
                doc! {
                    "_id": key,
                    "consumedAt": null,
                    "revokedAt": null,
                    "expiresAt": { "$gt": now },
                },
                doc! { "$set": { "consumedAt": now } },
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn revoke(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": key, "revokedAt": null },
                doc! { "$set": { "revokedAt": bson_time(now) } },
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn revoke_lineage(&self, lineage: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = self
            .collection
            .update_many(
                doc! {
                    "lineage": lineage,
                    "kind": { "$ne": "USER_CONSENT" },
                    "revokedAt": null,
                },
                doc! { "$set": { "revokedAt": bson_time(now) } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn find_consent(&self, subject: &str, client_id: &str) -> StoreResult<Option<Grant>> {
        self.get(&Grant::consent_key(subject, client_id)).await
    }

    async fn remove_consent(&self, subject: &str, client_id: &str) -> StoreResult<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": Grant::consent_key(subject, client_id) })
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn remove_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<u64> {
        let cutoff = bson_time(cutoff);
        let keys: Vec<Bson> = self
            .collection
            .clone_with_type::<Document>()
            .find(doc! { "expiresAt": { "$lt": cutoff } })
            .projection(doc! { "_id": 1 })
            .limit(limit as i64)
            .await?
            .try_collect::<Vec<Document>>()
            .await?
            .into_iter()
            .filter_map(|d| d.get("_id").cloned())
            .collect();

        if keys.is_empty() {
            return Ok(0);
        }

        let result = self
            .collection
            .delete_many(doc! { "_id": { "$in": keys }, "expiresAt": { "$lt": cutoff } })
            .await?;
        Ok(result.deleted_count)
    }
}
