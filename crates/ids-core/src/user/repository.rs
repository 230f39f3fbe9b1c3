//! User store abstraction.

use async_trait::async_trait;

use super::entity::{ExternalLogin, User};
use crate::shared::store::StoreResult;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Fails with `StoreError::Conflict` when the username is taken.
    async fn insert(&self, user: &User) -> StoreResult<()>;

    async fn update(&self, user: &User) -> StoreResult<()>;

    async fn set_enabled(&self, id: &str, enabled: bool) -> StoreResult<bool>;

    /// Atomically record `step` as the last accepted TOTP step.
    ///
    /// Returns false when a step at or beyond `step` was already recorded.
    async fn advance_otp_step(&self, id: &str, step: i64) -> StoreResult<bool>;

    async fn find_by_external_login(&self, provider: &str, subject: &str) -> StoreResult<Option<User>>;

    /// Fails with `StoreError::Conflict` when (provider, subject) is already linked.
    async fn link_external_login(&self, login: &ExternalLogin) -> StoreResult<()>;
}
