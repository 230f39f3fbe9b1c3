//! JWT claim sets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::registry::scope::parse_scope;

/// JWT `typ` header for access tokens (RFC 9068)
pub const ACCESS_TOKEN_TYP: &str = "at+jwt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    /// User id, or the client id for client-only tokens
    pub sub: String,
    pub aud: Vec<String>,
    pub client_id: String,
    /// Space-delimited granted scopes
    pub scope: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    /// User claims requested by the granted API resources
    #[serde(flatten)]
    pub user_claims: BTreeMap<String, serde_json::Value>,
}

impl AccessTokenClaims {
    pub fn scopes(&self) -> BTreeSet<String> {
        parse_scope(&self.scope)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == scope)
    }

    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.iter().any(|a| a == audience)
    }

    /// True for tokens issued on behalf of a user rather than a bare client
    pub fn has_user_subject(&self) -> bool {
        self.auth_time.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityTokenClaims {
    pub iss: String,
    pub sub: String,
    /// The client id
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    #[serde(flatten)]
    pub user_claims: BTreeMap<String, serde_json::Value>,
}
