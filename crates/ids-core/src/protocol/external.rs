//! Mapping external identities to local users.

use tracing::{info, warn};

use super::engine::ProtocolEngine;
use crate::idp::ExternalIdentity;
use crate::shared::error::{AuthError, Result};
use crate::shared::store::{guarded, StoreError};
use crate::user::{ExternalLogin, User};

impl ProtocolEngine {
    /// Local user linked to `identity`, provisioned on first login.
    /// Provisioned users have no password and can only sign in through
    /// the provider.
    pub async fn external_login(&self, identity: &ExternalIdentity) -> Result<User> {
        if let Some(user) = self.find_linked_user(identity).await? {
            return Self::ensure_enabled(user, identity);
        }

        let users = self.credentials.users();
        let timeout = self.config.store_timeout;

        let mut user = User::new(format!("{}:{}", identity.provider, identity.subject));
        user.claims = identity.claims.clone();
        let link = ExternalLogin::new(&identity.provider, &identity.subject, &user.id);

        let provisioned = async {
            users.insert(&user).await?;
            users.link_external_login(&link).await
        };
        match tokio::time::timeout(timeout, provisioned).await {
            Ok(Ok(())) => {
                info!(user_id = %user.id, provider = %identity.provider, "Provisioned user from external login");
                Ok(user)
            }
            // Either a concurrent first login won or an earlier attempt
            // stored the user but not the link
            Ok(Err(StoreError::Conflict(_))) => self.adopt_provisioned_user(identity, &user.username).await,
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(AuthError::StoreUnavailable),
        }
    }

    /// Finish a provisioning that stopped between the user insert and the
    /// link write.
    async fn adopt_provisioned_user(&self, identity: &ExternalIdentity, username: &str) -> Result<User> {
        if let Some(user) = self.find_linked_user(identity).await? {
            return Self::ensure_enabled(user, identity);
        }

        let users = self.credentials.users();
        let timeout = self.config.store_timeout;

        let existing = guarded(timeout, "users.find_by_username", users.find_by_username(username)).await?;
        // Password holders are local accounts and never get adopted
        let Some(user) = existing.filter(|u| u.password_hash.is_none()) else {
            warn!(username, provider = %identity.provider, "External username held by a local account");
            return Err(AuthError::internal(format!("username {username} is taken")));
        };

        let link = ExternalLogin::new(&identity.provider, &identity.subject, &user.id);
        match tokio::time::timeout(timeout, users.link_external_login(&link)).await {
            Ok(Ok(())) => {
                info!(user_id = %user.id, provider = %identity.provider, "Linked external login to provisioned user");
                Self::ensure_enabled(user, identity)
            }
            Ok(Err(StoreError::Conflict(_))) => match self.find_linked_user(identity).await? {
                Some(user) => Self::ensure_enabled(user, identity),
                None => Err(AuthError::StoreUnavailable),
            },
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(AuthError::StoreUnavailable),
        }
    }

    async fn find_linked_user(&self, identity: &ExternalIdentity) -> Result<Option<User>> {
        guarded(
            self.config.store_timeout,
            "users.find_by_external_login",
            self.credentials
                .users()
                .find_by_external_login(&identity.provider, &identity.subject),
        )
        .await
    }

    fn ensure_enabled(user: User, identity: &ExternalIdentity) -> Result<User> {
        if user.enabled {
            Ok(user)
        } else {
            warn!(user_id = %user.id, provider = %identity.provider, "External login for disabled user");
            Err(AuthError::access_denied("User is disabled"))
        }
    }
}
