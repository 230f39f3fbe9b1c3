//! Authorization code redemption and refresh token exchange.
//!
//! Both follow prepare-then-commit: tokens are signed and any new refresh
//! grant is stored first, and only then is the presented grant consumed with
//! an atomic conditional update. Losing that update discards the prepared
//! refresh grant, so a failed request never leaves a half-issued result.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{error, info, warn};

use super::engine::{ProtocolEngine, TokenParams, TokenResult};
use super::pkce::{self, METHOD_PLAIN};
use crate::grant::{Grant, GrantKind};
use crate::registry::scope::{join_scope, parse_scope, OFFLINE_ACCESS};
use crate::registry::{Client, GrantType, RefreshTokenUsage, Resources};
use crate::shared::crypto::{random_handle, sha256_b64};
use crate::shared::error::{AuthError, Result};
use crate::shared::store::guarded;
use crate::token::{IssueRequest, SignedToken};
use crate::user::User;

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::invalid_request(format!("{} is required", name)))
}

impl ProtocolEngine {
    pub(crate) async fn authorization_code_grant(&self, client: &Client, params: &TokenParams) -> Result<TokenResult> {
        let code = required(&params.code, "code")?;
        let redirect_uri = required(&params.redirect_uri, "redirect_uri")?;

        let grant = self
            .load_grant(&sha256_b64(code), GrantKind::AuthorizationCode)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid authorization code"))?;

        if grant.client_id != client.client_id {
            warn!(client_id = %client.client_id, "Authorization code presented by a different client");
            return Err(AuthError::invalid_grant("Invalid authorization code"));
        }
        if grant.is_consumed() {
            self.handle_replay(&grant).await;
            return Err(AuthError::invalid_grant("Authorization code has already been used"));
        }
        if grant.is_revoked() || grant.is_expired(Utc::now()) {
            return Err(AuthError::invalid_grant("Authorization code is expired"));
        }
        if grant.redirect_uri.as_deref() != Some(redirect_uri) {
            return Err(AuthError::invalid_grant("redirect_uri does not match the authorization request"));
        }
        Self::check_verifier(&grant, params.code_verifier.as_deref())?;
        Self::check_client_scopes(client, &grant)?;

        let user = self.load_active_user(&grant.subject).await?;
        let resources = self.resources_for(&grant.scopes).await?;
        let (access, id_token) = self.mint(client, &grant.scopes, &resources, &user, grant.auth_time, grant.nonce.as_deref())?;

        let refresh = if self.may_issue_refresh(client, &grant.scopes) {
            let handle = random_handle();
            let refresh_grant = Grant::refresh_token(
                &handle,
                &user.id,
                &client.client_id,
                grant.scopes.clone(),
                &grant.lineage,
                self.refresh_lifetime(client),
            )
            .with_auth_time(grant.auth_time);
            guarded(self.config.store_timeout, "grants.store", self.grants.store(&refresh_grant)).await?;
            Some((handle, refresh_grant))
        } else {
            None
        };

        self.commit_consumption(&grant, refresh.as_ref().map(|(_, g)| g)).await?;

        info!(client_id = %client.client_id, user_id = %user.id, "Redeemed authorization code");
        Ok(TokenResult {
            access_token: access.token,
            token_type: "Bearer".to_string(),
            expires_in: access.expires_in,
            refresh_token: refresh.map(|(handle, _)| handle),
            id_token: id_token.map(|t| t.token),
            scope: join_scope(&grant.scopes),
        })
    }

    pub(crate) async fn refresh_token_grant(&self, client: &Client, params: &TokenParams) -> Result<TokenResult> {
        let handle = required(&params.refresh_token, "refresh_token")?;

        let grant = self
            .load_grant(&sha256_b64(handle), GrantKind::RefreshToken)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid refresh token"))?;

        if grant.client_id != client.client_id {
            warn!(client_id = %client.client_id, "Refresh token presented by a different client");
            return Err(AuthError::invalid_grant("Invalid refresh token"));
        }
        if grant.is_revoked() {
            warn!(client_id = %client.client_id, lineage = %grant.lineage, "Revoked refresh token presented");
            return Err(AuthError::invalid_grant("Refresh token has been revoked"));
        }
        if grant.is_consumed() {
            self.handle_replay(&grant).await;
            return Err(AuthError::invalid_grant("Refresh token has already been used"));
        }
        if grant.is_expired(Utc::now()) {
            return Err(AuthError::invalid_grant("Refresh token has expired"));
        }
        Self::check_client_scopes(client, &grant)?;

        let scopes = match params.scope.as_deref().map(parse_scope) {
            Some(requested) if !requested.is_empty() => {
                if !requested.is_subset(&grant.scopes) {
                    return Err(AuthError::invalid_scope("Requested scope exceeds the original grant"));
                }
                requested
            }
            _ => grant.scopes.clone(),
        };

        let user = self.load_active_user(&grant.subject).await?;
        let resources = self.resources_for(&scopes).await?;
        let (access, id_token) = self.mint(client, &scopes, &resources, &user, grant.auth_time, None)?;

        let refresh_token = match client.refresh_token_usage {
            RefreshTokenUsage::ReUse => handle.to_string(),
            RefreshTokenUsage::OneTimeOnly => {
                let next_handle = random_handle();
                let next = Grant::refresh_token(
                    &next_handle,
                    &grant.subject,
                    &client.client_id,
                    grant.scopes.clone(),
                    &grant.lineage,
                    self.refresh_lifetime(client),
                )
                .with_auth_time(grant.auth_time);
                guarded(self.config.store_timeout, "grants.store", self.grants.store(&next)).await?;
                self.commit_consumption(&grant, Some(&next)).await?;
                next_handle
            }
        };

        info!(client_id = %client.client_id, user_id = %user.id, "Refreshed tokens");
        Ok(TokenResult {
            access_token: access.token,
            token_type: "Bearer".to_string(),
            expires_in: access.expires_in,
            refresh_token: Some(refresh_token),
            id_token: id_token.map(|t| t.token),
            scope: join_scope(&scopes),
        })
    }

    fn check_verifier(grant: &Grant, verifier: Option<&str>) -> Result<()> {
        match (grant.code_challenge.as_deref(), verifier) {
            (Some(challenge), Some(verifier)) => {
                let method = grant.code_challenge_method.as_deref().unwrap_or(METHOD_PLAIN);
                if pkce::verify(method, challenge, verifier) {
                    Ok(())
                } else {
                    warn!(client_id = %grant.client_id, "PKCE verification failed");
                    Err(AuthError::invalid_grant("code_verifier does not match the code_challenge"))
                }
            }
            (Some(_), None) => Err(AuthError::invalid_grant("code_verifier is required")),
            (None, Some(_)) => Err(AuthError::invalid_grant("code_verifier was not expected")),
            (None, None) => Ok(()),
        }
    }

    /// Scopes withdrawn from a client since the grant was made end the grant.
    fn check_client_scopes(client: &Client, grant: &Grant) -> Result<()> {
        if client.allows_scopes(&grant.scopes) {
            Ok(())
        } else {
            warn!(client_id = %client.client_id, lineage = %grant.lineage, "Grant scopes no longer allowed for client");
            Err(AuthError::invalid_grant("Grant exceeds the scopes allowed for this client"))
        }
    }

    fn may_issue_refresh(&self, client: &Client, scopes: &BTreeSet<String>) -> bool {
        scopes.contains(OFFLINE_ACCESS)
            && client.allow_offline_access
            && client.allows_grant_type(GrantType::RefreshToken)
    }

    fn refresh_lifetime(&self, client: &Client) -> chrono::Duration {
        client
            .refresh_token_lifetime_secs
            .map(chrono::Duration::seconds)
            .unwrap_or(self.config.refresh_token_lifetime)
    }

    fn mint(
        &self,
        client: &Client,
        scopes: &BTreeSet<String>,
        resources: &Resources,
        user: &User,
        auth_time: Option<i64>,
        nonce: Option<&str>,
    ) -> Result<(SignedToken, Option<SignedToken>)> {
        let request = IssueRequest::new(client, scopes, resources).for_user(user, auth_time);
        let access = self.issuer.issue_access_token(&request)?;

        let id_token = if resources.includes_openid() {
            let request = request.with_nonce(nonce).with_access_token(&access.token);
            Some(self.issuer.issue_identity_token(&request)?)
        } else {
            None
        };
        Ok((access, id_token))
    }

    async fn load_grant(&self, key: &str, kind: GrantKind) -> Result<Option<Grant>> {
        let grant = guarded(self.config.store_timeout, "grants.get", self.grants.get(key)).await?;
        Ok(grant.filter(|g| g.kind == kind))
    }

    pub(crate) async fn load_active_user(&self, user_id: &str) -> Result<User> {
        let user = guarded(
            self.config.store_timeout,
            "users.find_by_id",
            self.credentials.users().find_by_id(user_id),
        )
        .await?;
        match user {
            Some(user) if user.enabled => Ok(user),
            _ => Err(AuthError::invalid_grant("The user is no longer active")),
        }
    }

    /// Consume `grant`, or undo the prepared refresh grant and report why not.
    async fn commit_consumption(&self, grant: &Grant, prepared: Option<&Grant>) -> Result<()> {
        let consumed = guarded(
            self.config.store_timeout,
            "grants.try_consume",
            self.grants.try_consume(&grant.key, Utc::now()),
        )
        .await;

        match consumed {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.discard(prepared).await;
                let current = guarded(self.config.store_timeout, "grants.get", self.grants.get(&grant.key))
                    .await
                    .ok()
                    .flatten();
                if current.is_some_and(|g| g.is_consumed()) {
                    self.handle_replay(grant).await;
                }
                Err(AuthError::invalid_grant("Grant is no longer valid"))
            }
            Err(e) => {
                self.discard(prepared).await;
                Err(e)
            }
        }
    }

    async fn discard(&self, prepared: Option<&Grant>) {
        let Some(prepared) = prepared else {
            return;
        };
        if let Err(e) = guarded(
            self.config.store_timeout,
            "grants.revoke",
            self.grants.revoke(&prepared.key, Utc::now()),
        )
        .await
        {
            error!(error = %e, lineage = %prepared.lineage, "Could not discard prepared refresh token");
        }
    }

    /// A consumed grant was presented again: revoke everything derived from it.
    async fn handle_replay(&self, grant: &Grant) {
        warn!(
            client_id = %grant.client_id,
            lineage = %grant.lineage,
            kind = ?grant.kind,
            "Grant replay detected, revoking lineage"
        );
        match guarded(
            self.config.store_timeout,
            "grants.revoke_lineage",
            self.grants.revoke_lineage(&grant.lineage, Utc::now()),
        )
        .await
        {
            Ok(revoked) => warn!(lineage = %grant.lineage, revoked, "Revoked grant lineage"),
            Err(e) => error!(error = %e, lineage = %grant.lineage, "Lineage revocation failed"),
        }
    }

    pub(crate) async fn revoke_lineage(&self, lineage: &str) -> Result<u64> {
        guarded(
            self.config.store_timeout,
            "grants.revoke_lineage",
            self.grants.revoke_lineage(lineage, Utc::now()),
        )
        .await
    }
}
