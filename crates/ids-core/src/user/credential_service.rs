//! Resource-owner credential verification.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::entity::User;
use super::password_service::PasswordService;
use super::repository::UserStore;
use super::totp::Totp;
use crate::shared::crypto::random_handle;
use crate::shared::error::{AuthError, Result};
use crate::shared::store::guarded;

pub struct CredentialService {
    users: Arc<dyn UserStore>,
    passwords: Arc<PasswordService>,
    totp: Totp,
    store_timeout: Duration,
    /// Verified against when the username is unknown so that lookups of
    /// missing users cost the same as real ones
    dummy_hash: String,
}

impl CredentialService {
    pub fn new(
        users: Arc<dyn UserStore>,
        passwords: Arc<PasswordService>,
        store_timeout: Duration,
    ) -> Result<Self> {
        let dummy_hash = passwords.hash_password(&random_handle())?;
        Ok(Self {
            users,
            passwords,
            totp: Totp::default(),
            store_timeout,
            dummy_hash,
        })
    }

    pub fn with_totp(mut self, totp: Totp) -> Self {
        self.totp = totp;
        self
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Check a username/password pair.
    ///
    /// Unknown users, disabled users, users without a password and wrong
    /// passwords all fail with the same `InvalidCredentials`.
    pub async fn verify_password(&self, username: &str, password: &str) -> Result<User> {
        let user = guarded(
            self.store_timeout,
            "users.find_by_username",
            self.users.find_by_username(username),
        )
        .await?;

        let hash = user
            .as_ref()
            .and_then(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());

        let passwords = self.passwords.clone();
        let password = password.to_string();
        let matched = tokio::task::spawn_blocking(move || passwords.verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("Password verification task failed: {}", e)))??;

        match user {
            Some(user) if matched && user.enabled && user.password_hash.is_some() => {
                debug!(user_id = %user.id, "Password verified");
                Ok(user)
            }
            _ => {
                warn!("Password authentication failed");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Check a one-time code for `user` at the current time.
    pub async fn verify_second_factor(&self, user: &User, code: &str) -> Result<bool> {
        self.verify_second_factor_at(user, code, Utc::now().timestamp()).await
    }

    /// Check a one-time code at `unix_time`. A code is accepted at most once:
    /// the matched step must advance the user's last accepted step.
    pub async fn verify_second_factor_at(&self, user: &User, code: &str, unix_time: i64) -> Result<bool> {
        let Some(secret) = user.otp_secret_bytes() else {
            return Ok(false);
        };
        let Some(step) = self.totp.matching_step(&secret, code, unix_time) else {
            return Ok(false);
        };

        let advanced = guarded(
            self.store_timeout,
            "users.advance_otp_step",
            self.users.advance_otp_step(&user.id, step),
        )
        .await?;

        if !advanced {
            warn!(user_id = %user.id, "One-time code replay rejected");
        }
        Ok(advanced)
    }

    /// Password plus second factor when the user has one enrolled.
    pub async fn authenticate(&self, username: &str, password: &str, otp: Option<&str>) -> Result<User> {
        let user = self.verify_password(username, password).await?;
        if !user.has_second_factor() {
            return Ok(user);
        }
        match otp {
            Some(code) if self.verify_second_factor(&user, code).await? => Ok(user),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::memory::InMemoryUserStore;
    use crate::user::password_service::Argon2Config;

    async fn service_with(user: User) -> CredentialService {
        let store = Arc::new(InMemoryUserStore::new());
        store.insert(&user).await.unwrap();
        let passwords = Arc::new(PasswordService::new(Argon2Config::testing()).unwrap());
        CredentialService::new(store, passwords, Duration::from_secs(1)).unwrap()
    }

    fn hashed(password: &str) -> String {
        PasswordService::new(Argon2Config::testing())
            .unwrap()
            .hash_password(password)
            .unwrap()
    }

    #[tokio::test]
    async fn test_verify_password() {
        let service = service_with(User::new("alice").with_password_hash(hashed("pw1"))).await;

        assert_eq!(service.verify_password("alice", "pw1").await.unwrap().username, "alice");
        assert_eq!(
            service.verify_password("alice", "nope").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            service.verify_password("mallory", "pw1").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_disabled_user_cannot_sign_in() {
        let mut user = User::new("alice").with_password_hash(hashed("pw1"));
        user.enabled = false;
        let service = service_with(user).await;

        assert_eq!(
            service.verify_password("alice", "pw1").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_second_factor_is_single_use() {
        let secret = b"12345678901234567890";
        let user = User::new("alice").with_otp_secret(secret);
        let service = service_with(user.clone()).await;
        let now = 1_700_000_000;
        let code = Totp::default().code_at(secret, now).unwrap();

        assert!(service.verify_second_factor_at(&user, &code, now).await.unwrap());
        assert!(!service.verify_second_factor_at(&user, &code, now + 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_factor_outside_window() {
        let secret = b"12345678901234567890";
        let user = User::new("alice").with_otp_secret(secret);
        let service = service_with(user.clone()).await;
        let code = Totp::default().code_at(secret, 1_700_000_000).unwrap();

        assert!(!service.verify_second_factor_at(&user, &code, 1_700_000_000 + 300).await.unwrap());
    }
}
