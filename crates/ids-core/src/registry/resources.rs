//! Identity and API resources.
//!
//! Identity resources group user claims for identity tokens and userinfo.
//! API resources are token audiences; each exposes one or more scopes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::scope::{EMAIL, OFFLINE_ACCESS, OPENID, PROFILE};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResource {
    /// Scope name
    #[serde(rename = "_id")]
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub user_claims: Vec<String>,
    pub enabled: bool,
}

impl IdentityResource {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, claims: &[&str]) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            user_claims: claims.iter().map(|c| c.to_string()).collect(),
            enabled: true,
        }
    }

    pub fn openid() -> Self {
        Self::new(OPENID, "Your user identifier", &["sub"])
    }

    pub fn profile() -> Self {
        Self::new(
            PROFILE,
            "User profile",
            &["name", "family_name", "given_name", "preferred_username", "locale"],
        )
    }

    pub fn email() -> Self {
        Self::new(EMAIL, "Your email address", &["email", "email_verified"])
    }

    pub fn standard() -> Vec<Self> {
        vec![Self::openid(), Self::profile(), Self::email()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    /// Audience value
    #[serde(rename = "_id")]
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub user_claims: Vec<String>,
    pub enabled: bool,
}

impl ApiResource {
    /// Resource exposing a single scope with the same name
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            scopes: vec![name.clone()],
            name,
            display_name: display_name.into(),
            user_claims: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    pub fn with_user_claim(mut self, claim: impl Into<String>) -> Self {
        self.user_claims.push(claim.into());
        self
    }
}

/// Resources resolved from a scope set.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub identity: Vec<IdentityResource>,
    pub apis: Vec<ApiResource>,
    pub offline_access: bool,
}

impl Resources {
    /// Scopes from `requested` that resolved to a known, enabled resource
    pub fn resolved_scopes(&self, requested: &BTreeSet<String>) -> BTreeSet<String> {
        requested
            .iter()
            .filter(|scope| {
                (scope.as_str() == OFFLINE_ACCESS && self.offline_access)
                    || self.identity.iter().any(|r| &r.name == *scope)
                    || self.apis.iter().any(|r| r.scopes.contains(scope))
            })
            .cloned()
            .collect()
    }

    /// True when every requested scope resolved
    pub fn covers(&self, requested: &BTreeSet<String>) -> bool {
        self.resolved_scopes(requested).len() == requested.len()
    }

    pub fn has_identity_scopes(&self) -> bool {
        !self.identity.is_empty()
    }

    pub fn includes_openid(&self) -> bool {
        self.identity.iter().any(|r| r.name == OPENID)
    }

    /// Audience values for an access token
    pub fn audiences(&self) -> Vec<String> {
        self.apis.iter().map(|r| r.name.clone()).collect()
    }

    /// User claims requested by the API resources
    pub fn api_user_claims(&self) -> BTreeSet<String> {
        self.apis.iter().flat_map(|r| r.user_claims.iter().cloned()).collect()
    }

    /// User claims named by the identity resources, `sub` excluded
    pub fn identity_user_claims(&self) -> BTreeSet<String> {
        self.identity
            .iter()
            .flat_map(|r| r.user_claims.iter().cloned())
            .filter(|c| c != "sub")
            .collect()
    }
}
