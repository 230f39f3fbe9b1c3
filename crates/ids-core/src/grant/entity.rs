//! Grant Entity

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::crypto::sha256_b64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantKind {
    AuthorizationCode,
    RefreshToken,
    UserConsent,
}

/// A persisted authorization.
///
/// Codes move `Issued -> Consumed` or `Issued -> Expired` and never back.
/// Every grant derived from one code shares that code's `lineage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// SHA-256 of the client-held handle
    #[serde(rename = "_id")]
    pub key: String,

    pub kind: GrantKind,

    /// User id, or client id for client-only grants
    pub subject: String,

    pub client_id: String,

    pub scopes: BTreeSet<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,

    #[serde(default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub consumed_at: Option<DateTime<Utc>>,

    #[serde(default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub revoked_at: Option<DateTime<Utc>>,

    pub lineage: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// When the user authenticated (unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
}

impl Grant {
    fn new(kind: GrantKind, key: String, subject: &str, client_id: &str, scopes: BTreeSet<String>, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            key,
            kind,
            subject: subject.to_string(),
            client_id: client_id.to_string(),
            scopes,
            created_at: now,
            expires_at: now + lifetime,
            consumed_at: None,
            revoked_at: None,
            lineage: uuid::Uuid::new_v4().to_string(),
            redirect_uri: None,
            code_challenge: None,
            code_challenge_method: None,
            nonce: None,
            auth_time: None,
        }
    }

    /// Authorization code for the client-held `handle`
    pub fn authorization_code(
        handle: &str,
        subject: &str,
        client_id: &str,
        scopes: BTreeSet<String>,
        redirect_uri: &str,
        lifetime: Duration,
    ) -> Self {
        let mut grant = Self::new(GrantKind::AuthorizationCode, sha256_b64(handle), subject, client_id, scopes, lifetime);
        grant.redirect_uri = Some(redirect_uri.to_string());
        grant
    }

    /// Refresh token for the client-held `handle` in an existing lineage
    pub fn refresh_token(
        handle: &str,
        subject: &str,
        client_id: &str,
        scopes: BTreeSet<String>,
        lineage: &str,
        lifetime: Duration,
    ) -> Self {
        let mut grant = Self::new(GrantKind::RefreshToken, sha256_b64(handle), subject, client_id, scopes, lifetime);
        grant.lineage = lineage.to_string();
        grant
    }

    /// Remembered consent; one per (subject, client)
    pub fn consent(subject: &str, client_id: &str, scopes: BTreeSet<String>, lifetime: Duration) -> Self {
        Self::new(
            GrantKind::UserConsent,
            Self::consent_key(subject, client_id),
            subject,
            client_id,
            scopes,
            lifetime,
        )
    }

    pub fn consent_key(subject: &str, client_id: &str) -> String {
        sha256_b64(&format!("consent:{}:{}", subject, client_id))
    }

    pub fn with_pkce(mut self, challenge: impl Into<String>, method: impl Into<String>) -> Self {
        self.code_challenge = Some(challenge.into());
        self.code_challenge_method = Some(method.into());
        self
    }

    pub fn with_nonce(mut self, nonce: Option<String>) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_auth_time(mut self, auth_time: Option<i64>) -> Self {
        self.auth_time = auth_time;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Usable: neither consumed, revoked nor expired
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_consumed() && !self.is_revoked() && !self.is_expired(now)
    }
}
