//! Token revocation (RFC 7009) and the userinfo operation.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::engine::{ClientCredentials, ProtocolEngine};
use crate::grant::GrantKind;
use crate::registry::scope::OPENID;
use crate::shared::crypto::sha256_b64;
use crate::shared::error::{AuthError, Result};
use crate::shared::store::guarded;
use crate::token::issuer::select_claims;
use crate::token::TokenRequirement;

impl ProtocolEngine {
    /// Revoke a refresh token and everything in its lineage.
    ///
    /// Unknown tokens, access tokens and tokens owned by another client are
    /// accepted silently so the endpoint does not reveal token validity.
    pub async fn revoke_token(&self, credentials: &ClientCredentials, token: &str, token_type_hint: Option<&str>) -> Result<()> {
        let client = self.authenticate_client(credentials).await?;
        if token.is_empty() {
            return Err(AuthError::invalid_request("token is required"));
        }
        if token_type_hint == Some("access_token") && token.matches('.').count() == 2 {
            debug!(client_id = %client.client_id, "Self-contained access tokens expire on their own");
            return Ok(());
        }

        let grant = guarded(self.config.store_timeout, "grants.get", self.grants.get(&sha256_b64(token))).await?;
        match grant {
            Some(grant) if grant.kind == GrantKind::RefreshToken && grant.client_id == client.client_id => {
                let revoked = self.revoke_lineage(&grant.lineage).await?;
                info!(client_id = %client.client_id, lineage = %grant.lineage, revoked, "Refresh token revoked");
            }
            Some(_) => debug!(client_id = %client.client_id, "Revocation request for a foreign or non-refresh grant ignored"),
            None => debug!(client_id = %client.client_id, "Revocation request for an unknown token"),
        }
        Ok(())
    }

    /// Claims about the user behind an access token that granted `openid`.
    pub async fn user_info(&self, access_token: &str) -> Result<BTreeMap<String, serde_json::Value>> {
        let requirement = TokenRequirement::audience(self.issuer.config().default_audience()).with_scope(OPENID);
        let claims = self.validator.validate(access_token, &requirement)?;
        if !claims.has_user_subject() {
            return Err(AuthError::unauthorized("The access token has no user subject"));
        }

        let user = guarded(
            self.config.store_timeout,
            "users.find_by_id",
            self.credentials.users().find_by_id(&claims.sub),
        )
        .await?
        .filter(|u| u.enabled)
        .ok_or_else(|| AuthError::unauthorized("The user is no longer active"))?;

        let resources = self.resources_for(&claims.scopes()).await?;
        let mut info = select_claims(&user, &resources.identity_user_claims());
        info.insert("sub".to_string(), serde_json::Value::String(user.id.clone()));
        Ok(info)
    }
}
