//! Token Validator
//!
//! Resource-side verification of bearer access tokens. Every failure is
//! `Unauthorized`; a token is either fully accepted or rejected.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::debug;

use super::claims::{AccessTokenClaims, ACCESS_TOKEN_TYP};
use super::key_ring::KeyRing;
use crate::shared::error::{AuthError, Result};

/// What a protected operation demands of a token
#[derive(Debug, Clone)]
pub struct TokenRequirement {
    /// Registered name of the resource
    pub audience: String,
    pub scopes: BTreeSet<String>,
}

impl TokenRequirement {
    pub fn audience(audience: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            scopes: BTreeSet::new(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }
}

pub struct TokenValidator {
    issuer: String,
    keys: Arc<KeyRing>,
    leeway_secs: u64,
}

impl TokenValidator {
    pub fn new(issuer: impl Into<String>, keys: Arc<KeyRing>) -> Self {
        Self {
            issuer: issuer.into(),
            keys,
            leeway_secs: 60,
        }
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Verify signature, type, lifetime, issuer, audience and scopes.
    pub fn validate(&self, token: &str, requirement: &TokenRequirement) -> Result<AccessTokenClaims> {
        let claims = self.verify(token).map_err(|reason| {
            debug!(reason, "Bearer token rejected");
            AuthError::unauthorized("The access token is invalid")
        })?;

        if !claims.has_audience(&requirement.audience) {
            debug!(audience = %requirement.audience, "Bearer token audience mismatch");
            return Err(AuthError::unauthorized("The access token is not valid for this resource"));
        }
        if let Some(missing) = requirement.scopes.iter().find(|s| !claims.has_scope(s)) {
            debug!(scope = %missing, "Bearer token missing scope");
            return Err(AuthError::unauthorized("The access token lacks a required scope"));
        }
        Ok(claims)
    }

    fn verify(&self, token: &str) -> std::result::Result<AccessTokenClaims, &'static str> {
        let header = decode_header(token).map_err(|_| "malformed header")?;
        if header.alg != Algorithm::RS256 {
            return Err("unexpected algorithm");
        }
        if header.typ.as_deref() != Some(ACCESS_TOKEN_TYP) {
            return Err("not an access token");
        }
        let kid = header.kid.ok_or("missing kid")?;
        let key = self
            .keys
            .verification_key(&kid, Utc::now())
            .ok_or("unknown or expired signing key")?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;
        validation.validate_nbf = true;
        validation.leeway = self.leeway_secs;
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud", "nbf"]);

        decode::<AccessTokenClaims>(token, key.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => "expired",
                jsonwebtoken::errors::ErrorKind::ImmatureSignature => "not yet valid",
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => "wrong issuer",
                jsonwebtoken::errors::ErrorKind::InvalidSignature => "bad signature",
                _ => "undecodable",
            })
    }
}

/// Capability interface consumed by resource APIs
#[async_trait]
pub trait ResourceValidator: Send + Sync {
    async fn validate(&self, bearer_token: &str) -> Result<AccessTokenClaims>;
}

/// A validator bound to one resource's requirement
#[derive(Clone)]
pub struct ResourceGuard {
    validator: Arc<TokenValidator>,
    requirement: TokenRequirement,
}

impl ResourceGuard {
    pub fn new(validator: Arc<TokenValidator>, requirement: TokenRequirement) -> Self {
        Self { validator, requirement }
    }

    pub fn requirement(&self) -> &TokenRequirement {
        &self.requirement
    }
}

#[async_trait]
impl ResourceValidator for ResourceGuard {
    async fn validate(&self, bearer_token: &str) -> Result<AccessTokenClaims> {
        self.validator.validate(bearer_token, &self.requirement)
    }
}
