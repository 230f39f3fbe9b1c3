//! Grant store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entity::Grant;
use crate::shared::store::StoreResult;

#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Insert a code or refresh grant; consent grants replace any previous
    /// consent for the same (subject, client).
    async fn store(&self, grant: &Grant) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<Grant>>;

    /// Mark the grant consumed if, and only if, it is unconsumed, unrevoked
    /// and unexpired at `now`. Exactly one of any number of concurrent
    /// callers for the same key sees `true`.
    async fn try_consume(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn revoke(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Revoke every grant sharing `lineage`; returns how many changed
    async fn revoke_lineage(&self, lineage: &str, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn find_consent(&self, subject: &str, client_id: &str) -> StoreResult<Option<Grant>>;

    async fn remove_consent(&self, subject: &str, client_id: &str) -> StoreResult<bool>;

    /// Delete up to `limit` grants with `expires_at < cutoff`
    async fn remove_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<u64>;
}
