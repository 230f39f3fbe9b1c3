//! Token Issuer

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde::Serialize;
use tracing::debug;

use super::claims::{AccessTokenClaims, IdentityTokenClaims, ACCESS_TOKEN_TYP};
use super::key_ring::KeyRing;
use crate::registry::scope::join_scope;
use crate::registry::{Client, Resources};
use crate::shared::crypto::left_half_hash;
use crate::shared::error::{AuthError, Result};
use crate::user::User;

#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// `iss` claim value
    pub issuer_uri: String,
    pub access_token_lifetime: Duration,
    pub identity_token_lifetime: Duration,
}

impl IssuerConfig {
    pub fn new(issuer_uri: impl Into<String>) -> Self {
        Self {
            issuer_uri: issuer_uri.into().trim_end_matches('/').to_string(),
            access_token_lifetime: Duration::hours(1),
            identity_token_lifetime: Duration::minutes(5),
        }
    }

    /// Audience of the issuer's own endpoints (userinfo). Used when a token
    /// grants identity scopes or no API resource at all.
    pub fn default_audience(&self) -> String {
        format!("{}/resources", self.issuer_uri)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Identity,
}

/// Everything a token is derived from
pub struct IssueRequest<'a> {
    pub client: &'a Client,
    /// Granted scopes; never wider than the grant
    pub scopes: &'a BTreeSet<String>,
    pub resources: &'a Resources,
    /// Resource owner, absent for client-only tokens
    pub user: Option<&'a User>,
    pub auth_time: Option<i64>,
    pub nonce: Option<&'a str>,
    /// Access token the identity token accompanies (for `at_hash`)
    pub access_token: Option<&'a str>,
}

impl<'a> IssueRequest<'a> {
    pub fn new(client: &'a Client, scopes: &'a BTreeSet<String>, resources: &'a Resources) -> Self {
        Self {
            client,
            scopes,
            resources,
            user: None,
            auth_time: None,
            nonce: None,
            access_token: None,
        }
    }

    pub fn for_user(mut self, user: &'a User, auth_time: Option<i64>) -> Self {
        self.user = Some(user);
        self.auth_time = auth_time;
        self
    }

    pub fn with_nonce(mut self, nonce: Option<&'a str>) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_access_token(mut self, access_token: &'a str) -> Self {
        self.access_token = Some(access_token);
        self
    }

    fn subject(&self) -> &str {
        match self.user {
            Some(user) => &user.id,
            None => &self.client.client_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

pub struct TokenIssuer {
    config: IssuerConfig,
    keys: Arc<KeyRing>,
}

impl TokenIssuer {
    pub fn new(config: IssuerConfig, keys: Arc<KeyRing>) -> Self {
        Self { config, keys }
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    pub fn issuer_uri(&self) -> &str {
        &self.config.issuer_uri
    }

    pub fn key_ring(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    pub fn issue(&self, request: &IssueRequest<'_>, token_type: TokenType) -> Result<SignedToken> {
        match token_type {
            TokenType::Access => self.issue_access_token(request),
            TokenType::Identity => self.issue_identity_token(request),
        }
    }

    pub fn issue_access_token(&self, request: &IssueRequest<'_>) -> Result<SignedToken> {
        let now = Utc::now();
        let lifetime = request
            .client
            .access_token_lifetime_secs
            .map(Duration::seconds)
            .unwrap_or(self.config.access_token_lifetime);

        let mut aud = request.resources.audiences();
        if aud.is_empty() || request.resources.has_identity_scopes() {
            aud.push(self.config.default_audience());
        }

        let user_claims = match request.user {
            Some(user) => select_claims(user, &request.resources.api_user_claims()),
            None => BTreeMap::new(),
        };

        let claims = AccessTokenClaims {
            iss: self.config.issuer_uri.clone(),
            sub: request.subject().to_string(),
            aud,
            client_id: request.client.client_id.clone(),
            scope: join_scope(request.scopes),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            auth_time: request.user.map(|_| request.auth_time.unwrap_or(now.timestamp())),
            user_claims,
        };

        let token = self.sign(&claims, ACCESS_TOKEN_TYP)?;
        debug!(client_id = %claims.client_id, jti = %claims.jti, "Issued access token");
        Ok(SignedToken {
            token,
            expires_in: lifetime.num_seconds(),
        })
    }

    /// Identity token for a user-bound request that granted `openid`.
    pub fn issue_identity_token(&self, request: &IssueRequest<'_>) -> Result<SignedToken> {
        let user = request
            .user
            .ok_or_else(|| AuthError::internal("Identity token requested without a user"))?;
        let now = Utc::now();
        let lifetime = self.config.identity_token_lifetime;

        let user_claims = if request.client.always_include_user_claims_in_id_token || request.access_token.is_none() {
            select_claims(user, &request.resources.identity_user_claims())
        } else {
            BTreeMap::new()
        };

        let claims = IdentityTokenClaims {
            iss: self.config.issuer_uri.clone(),
            sub: user.id.clone(),
            aud: request.client.client_id.clone(),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            auth_time: Some(request.auth_time.unwrap_or(now.timestamp())),
            nonce: request.nonce.map(str::to_string),
            at_hash: request.access_token.map(left_half_hash),
            user_claims,
        };

        let token = self.sign(&claims, "JWT")?;
        debug!(client_id = %claims.aud, "Issued identity token");
        Ok(SignedToken {
            token,
            expires_in: lifetime.num_seconds(),
        })
    }

    fn sign<T: Serialize>(&self, claims: &T, typ: &str) -> Result<String> {
        let key = self.keys.signing_key();
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some(typ.to_string());
        header.kid = Some(key.kid.clone());
        encode(&header, claims, key.encoding_key())
            .map_err(|e| AuthError::internal(format!("Failed to encode JWT: {}", e)))
    }
}

/// User claims restricted to `names`
pub fn select_claims(user: &User, names: &BTreeSet<String>) -> BTreeMap<String, serde_json::Value> {
    user.claims
        .iter()
        .filter(|(name, _)| names.contains(*name))
        .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
        .collect()
}
