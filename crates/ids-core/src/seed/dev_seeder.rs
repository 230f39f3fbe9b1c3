//! Development data seeder.
//!
//! Loads clients, resources and users from a TOML fixture file. Nothing is
//! compiled in: every secret comes from the file, and the binary only runs
//! the seeder when both `seed.enabled` and `dev_mode` are set.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::registry::{ApiResource, Client, ClientStore, GrantType, IdentityResource, RefreshTokenUsage, ResourceStore};
use crate::shared::error::{AuthError, Result};
use crate::shared::store::StoreError;
use crate::user::{PasswordService, User, UserStore};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFixture {
    /// Register the standard openid/profile/email identity resources
    pub standard_identity_resources: bool,
    pub identity_resources: Vec<IdentityResourceSeed>,
    pub api_resources: Vec<ApiResourceSeed>,
    pub clients: Vec<ClientSeed>,
    pub users: Vec<UserSeed>,
}

#[derive(Debug, Deserialize)]
pub struct IdentityResourceSeed {
    pub name: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_claims: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiResourceSeed {
    pub name: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub user_claims: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientSeed {
    pub client_id: String,
    pub client_name: Option<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
    pub grant_types: Vec<GrantType>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default = "default_true")]
    pub require_client_secret: bool,
    #[serde(default = "default_true")]
    pub require_pkce: bool,
    #[serde(default)]
    pub allow_offline_access: bool,
    #[serde(default)]
    pub require_consent: bool,
    #[serde(default)]
    pub refresh_token_usage: RefreshTokenUsage,
}

#[derive(Debug, Deserialize)]
pub struct UserSeed {
    pub username: String,
    pub password: Option<String>,
    /// Hex encoded TOTP secret
    pub otp_secret: Option<String>,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl SeedFixture {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AuthError::internal(format!("Invalid seed fixture: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuthError::internal(format!("Cannot read seed fixture {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }
}

pub struct DevDataSeeder {
    clients: Arc<dyn ClientStore>,
    resources: Arc<dyn ResourceStore>,
    users: Arc<dyn UserStore>,
    passwords: Arc<PasswordService>,
}

/// Existing records are left alone
fn skip_conflict(result: std::result::Result<(), StoreError>, what: &str) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(StoreError::Conflict(_)) => {
            debug!(what, "Seed record already exists");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

impl DevDataSeeder {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        resources: Arc<dyn ResourceStore>,
        users: Arc<dyn UserStore>,
        passwords: Arc<PasswordService>,
    ) -> Self {
        Self {
            clients,
            resources,
            users,
            passwords,
        }
    }

    pub async fn seed_from_file(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Seeding development data");
        self.seed(&SeedFixture::from_file(path)?).await
    }

    pub async fn seed(&self, fixture: &SeedFixture) -> Result<()> {
        if fixture.standard_identity_resources {
            for resource in IdentityResource::standard() {
                self.resources.insert_identity_resource(&resource).await?;
            }
        }
        for seed in &fixture.identity_resources {
            let claims: Vec<&str> = seed.user_claims.iter().map(String::as_str).collect();
            let resource = IdentityResource::new(&seed.name, seed.display_name.as_deref().unwrap_or(&seed.name), &claims);
            self.resources.insert_identity_resource(&resource).await?;
        }
        for seed in &fixture.api_resources {
            let mut resource = ApiResource::new(&seed.name, seed.display_name.as_deref().unwrap_or(&seed.name));
            for scope in &seed.scopes {
                resource = resource.with_scope(scope);
            }
            resource.user_claims = seed.user_claims.clone();
            self.resources.insert_api_resource(&resource).await?;
        }

        let mut created_clients = 0;
        for seed in &fixture.clients {
            if skip_conflict(self.clients.insert(&Self::client_from(seed)).await, "client")? {
                created_clients += 1;
            }
        }

        let mut created_users = 0;
        for seed in &fixture.users {
            if skip_conflict(self.users.insert(&self.user_from(seed)?).await, "user")? {
                created_users += 1;
            }
        }

        info!(
            identity_resources = fixture.identity_resources.len(),
            api_resources = fixture.api_resources.len(),
            clients = created_clients,
            users = created_users,
            "Development data seeded"
        );
        Ok(())
    }

    fn client_from(seed: &ClientSeed) -> Client {
        let mut client = Client::new(&seed.client_id)
            .with_name(seed.client_name.clone().unwrap_or_else(|| seed.client_id.clone()))
            .with_refresh_token_usage(seed.refresh_token_usage);
        for grant_type in &seed.grant_types {
            client = client.with_grant_type(*grant_type);
        }
        for secret in &seed.secrets {
            client = client.with_secret(secret);
        }
        for scope in &seed.scopes {
            client = client.with_scope(scope);
        }
        for uri in &seed.redirect_uris {
            client = client.with_redirect_uri(uri);
        }
        client.require_client_secret = seed.require_client_secret;
        client.require_pkce = seed.require_pkce || !seed.require_client_secret;
        client.allow_offline_access = seed.allow_offline_access;
        client.require_consent = seed.require_consent;
        client
    }

    fn user_from(&self, seed: &UserSeed) -> Result<User> {
        let mut user = User::new(&seed.username);
        if let Some(password) = &seed.password {
            user = user.with_password_hash(self.passwords.hash_password(password)?);
        }
        if let Some(secret) = &seed.otp_secret {
            let bytes = hex::decode(secret)
                .map_err(|_| AuthError::internal(format!("otp_secret for {} is not hex", seed.username)))?;
            user = user.with_otp_secret(&bytes);
        }
        user.claims = seed.claims.clone();
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::scope::parse_scope;
    use crate::registry::InMemoryRegistry;
    use crate::user::{Argon2Config, InMemoryUserStore};

    const FIXTURE: &str = r#"
standard_identity_resources = true

[[api_resources]]
name = "orders"
scopes = ["orders", "orders.write"]

[[clients]]
client_id = "svc"
secrets = ["from-the-file"]
grant_types = ["client_credentials"]
scopes = ["orders"]

[[clients]]
client_id = "spa"
require_client_secret = false
grant_types = ["authorization_code", "refresh_token"]
scopes = ["openid", "orders"]
redirect_uris = ["http://localhost:3000/cb"]
refresh_token_usage = "RE_USE"

[[users]]
username = "dev"
password = "dev-password"
claims = { email = "dev@example.com" }
"#;

    #[tokio::test]
    async fn test_seed_fixture() {
        let registry = Arc::new(InMemoryRegistry::new());
        let users = Arc::new(InMemoryUserStore::new());
        let passwords = Arc::new(PasswordService::new(Argon2Config::testing()).unwrap());
        let seeder = DevDataSeeder::new(registry.clone(), registry.clone(), users.clone(), passwords.clone());

        let fixture = SeedFixture::from_toml(FIXTURE).unwrap();
        seeder.seed(&fixture).await.unwrap();
        // Second run is a no-op
        seeder.seed(&fixture).await.unwrap();

        let svc = registry.find_enabled_client("svc").await.unwrap().unwrap();
        assert!(svc.verify_secret("from-the-file", chrono::Utc::now()));
        assert!(svc.allows_grant_type(GrantType::ClientCredentials));

        let spa = registry.find_enabled_client("spa").await.unwrap().unwrap();
        assert!(!spa.require_client_secret);
        assert!(spa.require_pkce);
        assert_eq!(spa.refresh_token_usage, RefreshTokenUsage::ReUse);

        let resources = registry.find_resources_by_scopes(&parse_scope("openid orders.write")).await.unwrap();
        assert!(resources.includes_openid());
        assert_eq!(resources.audiences(), vec!["orders".to_string()]);

        let dev = users.find_by_username("dev").await.unwrap().unwrap();
        assert!(passwords.verify_password("dev-password", dev.password_hash.as_deref().unwrap()).unwrap());
        assert_eq!(dev.claims.get("email").map(String::as_str), Some("dev@example.com"));
    }

    #[test]
    fn test_invalid_fixture() {
        assert!(SeedFixture::from_toml("clients = 3").is_err());
    }
}
