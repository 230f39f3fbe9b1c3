//! Engine wiring, client authentication and token endpoint dispatch.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::grant::GrantStore;
use crate::idp::ExternalProviders;
use crate::registry::scope::{join_scope, parse_scope, OFFLINE_ACCESS};
use crate::registry::{Client, ClientStore, GrantType, ResourceStore, Resources};
use crate::shared::error::{AuthError, Result};
use crate::shared::store::guarded;
use crate::token::{IssueRequest, TokenIssuer, TokenValidator};
use crate::user::CredentialService;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on every store call
    pub store_timeout: Duration,
    pub authorization_code_lifetime: chrono::Duration,
    pub refresh_token_lifetime: chrono::Duration,
    pub consent_lifetime: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            authorization_code_lifetime: chrono::Duration::seconds(300),
            refresh_token_lifetime: chrono::Duration::days(30),
            consent_lifetime: chrono::Duration::days(365),
        }
    }
}

/// Credentials presented at the token endpoint
#[derive(Debug, Clone, Default)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: Option<&str>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.map(str::to_string),
        }
    }
}

/// Grant-specific token request parameters
#[derive(Debug, Clone, Default)]
pub struct TokenParams {
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Successful token response (RFC 6749 §5.1)
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResult {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

pub struct ProtocolEngine {
    pub(crate) config: EngineConfig,
    pub(crate) clients: Arc<dyn ClientStore>,
    pub(crate) resources: Arc<dyn ResourceStore>,
    pub(crate) grants: Arc<dyn GrantStore>,
    pub(crate) credentials: Arc<CredentialService>,
    pub(crate) issuer: Arc<TokenIssuer>,
    pub(crate) validator: Arc<TokenValidator>,
    pub(crate) external: ExternalProviders,
}

impl ProtocolEngine {
    pub fn new(
        config: EngineConfig,
        clients: Arc<dyn ClientStore>,
        resources: Arc<dyn ResourceStore>,
        grants: Arc<dyn GrantStore>,
        credentials: Arc<CredentialService>,
        issuer: Arc<TokenIssuer>,
        validator: Arc<TokenValidator>,
    ) -> Self {
        Self {
            config,
            clients,
            resources,
            grants,
            credentials,
            issuer,
            validator,
            external: ExternalProviders::new(),
        }
    }

    pub fn with_external_providers(mut self, providers: ExternalProviders) -> Self {
        self.external = providers;
        self
    }

    pub fn credentials(&self) -> &Arc<CredentialService> {
        &self.credentials
    }

    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    pub fn external_providers(&self) -> &ExternalProviders {
        &self.external
    }

    /// Token endpoint entry point.
    pub async fn request_token(
        &self,
        grant_type: &str,
        credentials: &ClientCredentials,
        params: &TokenParams,
    ) -> Result<TokenResult> {
        let grant_type: GrantType = grant_type.parse().map_err(|grant_type| AuthError::UnsupportedGrantType { grant_type })?;

        let client = self.authenticate_client(credentials).await?;
        if !client.allows_grant_type(grant_type) {
            warn!(client_id = %client.client_id, grant_type = %grant_type, "Grant type not allowed for client");
            return Err(AuthError::invalid_client(format!(
                "Client is not allowed to use the {} grant",
                grant_type
            )));
        }

        match grant_type {
            GrantType::ClientCredentials => self.client_credentials_grant(&client, params).await,
            GrantType::AuthorizationCode => self.authorization_code_grant(&client, params).await,
            GrantType::RefreshToken => self.refresh_token_grant(&client, params).await,
        }
    }

    /// Look up an enabled client and check its secret. Public clients
    /// authenticate by id alone.
    pub async fn authenticate_client(&self, credentials: &ClientCredentials) -> Result<Client> {
        if credentials.client_id.is_empty() {
            return Err(AuthError::invalid_client("Client authentication failed"));
        }

        let client = self.find_client(&credentials.client_id).await?.ok_or_else(|| {
            warn!(client_id = %credentials.client_id, "Unknown or disabled client");
            AuthError::invalid_client("Client authentication failed")
        })?;

        if client.require_client_secret {
            let verified = credentials
                .client_secret
                .as_deref()
                .is_some_and(|secret| client.verify_secret(secret, Utc::now()));
            if !verified {
                warn!(client_id = %client.client_id, "Client secret verification failed");
                return Err(AuthError::invalid_client("Client authentication failed"));
            }
        }
        Ok(client)
    }

    async fn client_credentials_grant(&self, client: &Client, params: &TokenParams) -> Result<TokenResult> {
        if !client.require_client_secret {
            return Err(AuthError::invalid_client("Public clients cannot use client credentials"));
        }

        let requested = match params.scope.as_deref().map(parse_scope) {
            Some(scopes) if !scopes.is_empty() => scopes,
            _ => client.allowed_scopes.clone(),
        };
        if requested.is_empty() {
            return Err(AuthError::invalid_scope("No scope requested"));
        }
        if !client.allows_scopes(&requested) {
            warn!(client_id = %client.client_id, "Requested scope exceeds client registration");
            return Err(AuthError::invalid_scope("Requested scope is not allowed for this client"));
        }

        let resources = self.resources_for(&requested).await?;
        if requested.contains(OFFLINE_ACCESS) || resources.has_identity_scopes() {
            return Err(AuthError::invalid_scope("Identity scopes require a user"));
        }
        if !resources.covers(&requested) {
            return Err(AuthError::invalid_scope("Requested scope is unknown"));
        }

        let access = self
            .issuer
            .issue_access_token(&IssueRequest::new(client, &requested, &resources))?;

        info!(client_id = %client.client_id, "Issued client credentials token");
        Ok(TokenResult {
            access_token: access.token,
            token_type: "Bearer".to_string(),
            expires_in: access.expires_in,
            refresh_token: None,
            id_token: None,
            scope: join_scope(&requested),
        })
    }

    pub(crate) async fn find_client(&self, client_id: &str) -> Result<Option<Client>> {
        guarded(
            self.config.store_timeout,
            "clients.find_enabled_client",
            self.clients.find_enabled_client(client_id),
        )
        .await
    }

    pub(crate) async fn resources_for(&self, scopes: &BTreeSet<String>) -> Result<Resources> {
        guarded(
            self.config.store_timeout,
            "resources.find_resources_by_scopes",
            self.resources.find_resources_by_scopes(scopes),
        )
        .await
    }
}
