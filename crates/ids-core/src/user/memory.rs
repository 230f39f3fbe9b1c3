//! In-memory user store.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};

use super::entity::{ExternalLogin, User};
use super::repository::UserStore;
use crate::shared::store::{StoreError, StoreResult};

#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
    usernames: DashMap<String, String>,
    logins: DashMap<(String, String), ExternalLogin>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let Some(id) = self.usernames.get(username).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn insert(&self, user: &User) -> StoreResult<()> {
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!("username {}", user.username))),
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
                self.users.insert(user.id.clone(), user.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        match self.users.get_mut(&user.id) {
            Some(mut existing) => {
                *existing = user.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::Backend(format!("user {} not found", user.id))),
        }
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> StoreResult<bool> {
        Ok(match self.users.get_mut(id) {
            Some(mut user) => {
                user.enabled = enabled;
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn advance_otp_step(&self, id: &str, step: i64) -> StoreResult<bool> {
        let Some(mut user) = self.users.get_mut(id) else {
            return Ok(false);
        };
        if user.last_otp_step.is_some_and(|last| last >= step) {
            return Ok(false);
        }
        user.last_otp_step = Some(step);
        Ok(true)
    }

    async fn find_by_external_login(&self, provider: &str, subject: &str) -> StoreResult<Option<User>> {
        let key = (provider.to_string(), subject.to_string());
        let Some(user_id) = self.logins.get(&key).map(|l| l.user_id.clone()) else {
            return Ok(None);
        };
        self.find_by_id(&user_id).await
    }

    async fn link_external_login(&self, login: &ExternalLogin) -> StoreResult<()> {
        match self.logins.entry((login.provider.clone(), login.subject.clone())) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "external login {}/{}",
                login.provider, login.subject
            ))),
            Entry::Vacant(slot) => {
                slot.insert(login.clone());
                Ok(())
            }
        }
    }
}
