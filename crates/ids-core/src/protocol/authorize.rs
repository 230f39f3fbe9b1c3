//! Authorization endpoint logic: request validation, consent and code issuance.

use chrono::Utc;
use tracing::{info, warn};

use super::engine::ProtocolEngine;
use super::pkce::{self, METHOD_PLAIN, METHOD_S256};
use crate::grant::Grant;
use crate::registry::scope::{join_scope, parse_scope};
use crate::registry::{Client, GrantType};
use crate::shared::crypto::random_handle;
use crate::shared::error::{AuthError, Result};
use crate::shared::store::guarded;
use crate::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    Granted,
    Denied,
}

impl ConsentDecision {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "granted" | "allow" | "yes" => Some(Self::Granted),
            "denied" | "deny" | "no" => Some(Self::Denied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
    pub consent: Option<ConsentDecision>,
    pub remember_consent: bool,
}

impl AuthorizeRequest {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            response_type: "code".to_string(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            state: None,
            code_challenge: None,
            code_challenge_method: None,
            nonce: None,
            consent: None,
            remember_consent: false,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_pkce(mut self, challenge: impl Into<String>, method: impl Into<String>) -> Self {
        self.code_challenge = Some(challenge.into());
        self.code_challenge_method = Some(method.into());
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_consent(mut self, decision: ConsentDecision, remember: bool) -> Self {
        self.consent = Some(decision);
        self.remember_consent = remember;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: Option<String>,
    pub redirect_uri: String,
    pub scope: String,
}

impl AuthorizationResponse {
    /// Redirect target carrying `code` and `state`
    pub fn redirect_url(&self) -> String {
        let mut params = vec![("code", self.code.as_str())];
        if let Some(state) = &self.state {
            params.push(("state", state.as_str()));
        }
        append_query(&self.redirect_uri, &params)
    }
}

/// Redirect target carrying an error, used once the redirect URI is trusted
pub fn error_redirect_url(redirect_uri: &str, error: &AuthError, state: Option<&str>) -> String {
    let description = error.safe_description();
    let mut params = vec![("error", error.error_code()), ("error_description", description.as_str())];
    if let Some(state) = state {
        params.push(("state", state));
    }
    append_query(redirect_uri, &params)
}

fn append_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}

impl ProtocolEngine {
    /// Checks that must pass before errors may be sent to the redirect URI:
    /// the client exists and the URI is registered for it.
    pub async fn validate_redirect(&self, request: &AuthorizeRequest) -> Result<Client> {
        let client = self
            .find_client(&request.client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

        if !client.has_redirect_uri(&request.redirect_uri) {
            warn!(client_id = %client.client_id, "Redirect URI not registered");
            return Err(AuthError::invalid_request("redirect_uri is not registered for this client"));
        }
        Ok(client)
    }

    /// Issue an authorization code for an authenticated user.
    pub async fn authorize(&self, request: &AuthorizeRequest, user: &User) -> Result<AuthorizationResponse> {
        let client = self.validate_redirect(request).await?;

        if request.response_type != "code" {
            return Err(AuthError::UnsupportedResponseType {
                response_type: request.response_type.clone(),
            });
        }
        if !client.allows_grant_type(GrantType::AuthorizationCode) {
            return Err(AuthError::unauthorized_client("Client is not allowed to use the authorization code grant"));
        }
        if !user.enabled {
            return Err(AuthError::access_denied("User is disabled"));
        }

        let scopes = parse_scope(&request.scope);
        if scopes.is_empty() {
            return Err(AuthError::invalid_scope("No scope requested"));
        }
        if !client.allows_scopes(&scopes) {
            return Err(AuthError::invalid_scope("Requested scope is not allowed for this client"));
        }
        let resources = self.resources_for(&scopes).await?;
        if !resources.covers(&scopes) {
            return Err(AuthError::invalid_scope("Requested scope is unknown"));
        }

        let pkce = Self::check_pkce(&client, request)?;
        self.check_consent(&client, user, request, &scopes).await?;

        let handle = random_handle();
        let lifetime = client
            .authorization_code_lifetime_secs
            .map(chrono::Duration::seconds)
            .unwrap_or(self.config.authorization_code_lifetime);
        let mut grant = Grant::authorization_code(&handle, &user.id, &client.client_id, scopes.clone(), &request.redirect_uri, lifetime)
            .with_nonce(request.nonce.clone())
            .with_auth_time(Some(Utc::now().timestamp()));
        if let Some((challenge, method)) = pkce {
            grant = grant.with_pkce(challenge, method);
        }

        guarded(self.config.store_timeout, "grants.store", self.grants.store(&grant)).await?;

        info!(client_id = %client.client_id, user_id = %user.id, "Issued authorization code");
        Ok(AuthorizationResponse {
            code: handle,
            state: request.state.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scope: join_scope(&scopes),
        })
    }

    fn check_pkce(client: &Client, request: &AuthorizeRequest) -> Result<Option<(String, String)>> {
        let Some(challenge) = request.code_challenge.as_deref().filter(|c| !c.is_empty()) else {
            if client.require_pkce || !client.require_client_secret {
                return Err(AuthError::invalid_request("code_challenge is required"));
            }
            return Ok(None);
        };

        let method = request.code_challenge_method.as_deref().unwrap_or(METHOD_PLAIN);
        match method {
            METHOD_S256 => {}
            METHOD_PLAIN if client.allow_plain_text_pkce => {}
            METHOD_PLAIN => return Err(AuthError::invalid_request("Transform algorithm not supported")),
            _ => return Err(AuthError::invalid_request("Unknown code_challenge_method")),
        }
        if !pkce::is_valid_challenge(challenge) {
            return Err(AuthError::invalid_request("Malformed code_challenge"));
        }
        Ok(Some((challenge.to_string(), method.to_string())))
    }

    async fn check_consent(
        &self,
        client: &Client,
        user: &User,
        request: &AuthorizeRequest,
        scopes: &std::collections::BTreeSet<String>,
    ) -> Result<()> {
        if !client.require_consent {
            return Ok(());
        }

        match request.consent {
            Some(ConsentDecision::Denied) => Err(AuthError::access_denied("The user denied the request")),
            Some(ConsentDecision::Granted) => {
                if request.remember_consent {
                    let consent = Grant::consent(&user.id, &client.client_id, scopes.clone(), self.config.consent_lifetime);
                    guarded(self.config.store_timeout, "grants.store_consent", self.grants.store(&consent)).await?;
                }
                Ok(())
            }
            None => {
                let stored = guarded(
                    self.config.store_timeout,
                    "grants.find_consent",
                    self.grants.find_consent(&user.id, &client.client_id),
                )
                .await?;
                let now = Utc::now();
                match stored {
                    Some(consent) if !consent.is_expired(now) && scopes.is_subset(&consent.scopes) => Ok(()),
                    _ => Err(AuthError::ConsentRequired),
                }
            }
        }
    }

    /// Forget a remembered consent
    pub async fn revoke_consent(&self, user_id: &str, client_id: &str) -> Result<bool> {
        guarded(
            self.config.store_timeout,
            "grants.remove_consent",
            self.grants.remove_consent(user_id, client_id),
        )
        .await
    }
}
