//! Client Entity

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::crypto::{constant_time_eq, sha256_b64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "client_credentials" => Ok(Self::ClientCredentials),
            "refresh_token" => Ok(Self::RefreshToken),
            other => Err(other.to_string()),
        }
    }
}

/// What happens to a refresh token when it is redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshTokenUsage {
    /// Consumed and replaced by a new handle in the same lineage
    #[default]
    OneTimeOnly,
    /// Handle stays valid until it expires or is revoked
    ReUse,
}

/// A client secret, stored only as its SHA-256 hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSecret {
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ClientSecret {
    pub fn from_plaintext(secret: &str) -> Self {
        Self {
            hash: sha256_b64(secret),
            description: None,
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(rename = "_id")]
    pub id: String,

    /// Public identifier presented at the protocol endpoints
    pub client_id: String,

    pub client_name: String,

    pub enabled: bool,

    pub allowed_grant_types: BTreeSet<GrantType>,

    #[serde(default)]
    pub secrets: Vec<ClientSecret>,

    #[serde(default)]
    pub allowed_scopes: BTreeSet<String>,

    #[serde(default)]
    pub redirect_uris: BTreeSet<String>,

    /// False for public clients (native/SPA), which must use PKCE
    pub require_client_secret: bool,

    pub require_pkce: bool,

    #[serde(default)]
    pub allow_plain_text_pkce: bool,

    #[serde(default)]
    pub allow_offline_access: bool,

    #[serde(default)]
    pub require_consent: bool,

    #[serde(default)]
    pub refresh_token_usage: RefreshTokenUsage,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_lifetime_secs: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code_lifetime_secs: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_lifetime_secs: Option<i64>,

    #[serde(default)]
    pub always_include_user_claims_in_id_token: bool,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Confidential client with PKCE required for the code flow
    pub fn new(client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_name: client_id.clone(),
            client_id,
            enabled: true,
            allowed_grant_types: BTreeSet::new(),
            secrets: Vec::new(),
            allowed_scopes: BTreeSet::new(),
            redirect_uris: BTreeSet::new(),
            require_client_secret: true,
            require_pkce: true,
            allow_plain_text_pkce: false,
            allow_offline_access: false,
            require_consent: false,
            refresh_token_usage: RefreshTokenUsage::OneTimeOnly,
            access_token_lifetime_secs: None,
            authorization_code_lifetime_secs: None,
            refresh_token_lifetime_secs: None,
            always_include_user_claims_in_id_token: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_grant_type(mut self, grant_type: GrantType) -> Self {
        self.allowed_grant_types.insert(grant_type);
        self
    }

    pub fn with_secret(mut self, plaintext: &str) -> Self {
        self.secrets.push(ClientSecret::from_plaintext(plaintext));
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.allowed_scopes.insert(scope.into());
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.insert(uri.into());
        self
    }

    pub fn public(mut self) -> Self {
        self.require_client_secret = false;
        self.require_pkce = true;
        self
    }

    pub fn with_offline_access(mut self) -> Self {
        self.allow_offline_access = true;
        self
    }

    pub fn with_refresh_token_usage(mut self, usage: RefreshTokenUsage) -> Self {
        self.refresh_token_usage = usage;
        self
    }

    pub fn allows_grant_type(&self, grant_type: GrantType) -> bool {
        self.allowed_grant_types.contains(&grant_type)
    }

    /// Every requested scope must be registered for the client.
    /// `offline_access` additionally needs `allow_offline_access`.
    pub fn allows_scopes(&self, requested: &BTreeSet<String>) -> bool {
        requested.iter().all(|scope| {
            if scope == super::scope::OFFLINE_ACCESS {
                self.allow_offline_access
            } else {
                self.allowed_scopes.contains(scope)
            }
        })
    }

    /// Exact, case-sensitive match against a registered redirect URI
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.contains(uri)
    }

    /// Compare a presented secret against every unexpired registered secret.
    pub fn verify_secret(&self, presented: &str, now: DateTime<Utc>) -> bool {
        let presented_hash = sha256_b64(presented);
        let mut matched = false;
        for secret in self.secrets.iter().filter(|s| !s.is_expired(now)) {
            matched |= constant_time_eq(&secret.hash, &presented_hash);
        }
        matched
    }
}
