//! In-memory grant store.
//!
//! Per-entry locking in `DashMap` gives the per-row atomicity consumption needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};

use super::entity::{Grant, GrantKind};
use super::repository::GrantStore;
use crate::shared::store::{StoreError, StoreResult};

#[derive(Default)]
pub struct InMemoryGrantStore {
    grants: DashMap<String, Grant>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn store(&self, grant: &Grant) -> StoreResult<()> {
        if grant.kind == GrantKind::UserConsent {
            self.grants.insert(grant.key.clone(), grant.clone());
            return Ok(());
        }
        match self.grants.entry(grant.key.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict("grant key".to_string())),
            Entry::Vacant(slot) => {
                slot.insert(grant.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Grant>> {
        Ok(self.grants.get(key).map(|g| g.clone()))
    }

    async fn try_consume(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let Some(mut grant) = self.grants.get_mut(key) else {
            return Ok(false);
        };
        if !grant.is_active(now) {
            return Ok(false);
        }
        grant.consumed_at = Some(now);
        Ok(true)
    }

    async fn revoke(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(match self.grants.get_mut(key) {
            Some(mut grant) if grant.revoked_at.is_none() => {
                grant.revoked_at = Some(now);
                true
            }
            _ => false,
        })
    }

    async fn revoke_lineage(&self, lineage: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut revoked = 0;
        for mut grant in self.grants.iter_mut() {
            if grant.lineage == lineage && grant.kind != GrantKind::UserConsent && grant.revoked_at.is_none() {
                grant.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn find_consent(&self, subject: &str, client_id: &str) -> StoreResult<Option<Grant>> {
        self.get(&Grant::consent_key(subject, client_id)).await
    }

    async fn remove_consent(&self, subject: &str, client_id: &str) -> StoreResult<bool> {
        Ok(self.grants.remove(&Grant::consent_key(subject, client_id)).is_some())
    }

    async fn remove_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<u64> {
        let candidates: Vec<String> = self
            .grants
            .iter()
            .filter(|g| g.expires_at < cutoff)
            .take(limit)
            .map(|g| g.key.clone())
            .collect();

        let mut removed = 0;
        for key in candidates {
            if self.grants.remove_if(&key, |_, g| g.expires_at < cutoff).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
