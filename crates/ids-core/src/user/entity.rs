//! User Entity

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resource owner.
///
/// Users are never hard-deleted; disabling is the only way to retire one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,

    pub username: String,

    /// Argon2id PHC string. Absent for users that only sign in through an
    /// external provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    /// Hex encoded TOTP secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_secret: Option<String>,

    /// Last accepted TOTP time step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_otp_step: Option<i64>,

    /// Profile claims (`name`, `email`, ...)
    #[serde(default)]
    pub claims: BTreeMap<String, String>,

    pub enabled: bool,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            password_hash: None,
            otp_secret: None,
            last_otp_step: None,
            claims: BTreeMap::new(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    pub fn with_otp_secret(mut self, secret: &[u8]) -> Self {
        self.otp_secret = Some(hex::encode(secret));
        self
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    pub fn has_second_factor(&self) -> bool {
        self.otp_secret.is_some()
    }

    pub fn otp_secret_bytes(&self) -> Option<Vec<u8>> {
        self.otp_secret.as_deref().and_then(|s| hex::decode(s).ok())
    }
}

/// Link between an external provider identity and a local user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLogin {
    #[serde(rename = "_id")]
    pub id: String,
    pub provider: String,
    pub subject: String,
    pub user_id: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ExternalLogin {
    pub fn new(provider: impl Into<String>, subject: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            provider: provider.into(),
            subject: subject.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_secret_is_hex_round_trippable() {
        let user = User::new("alice").with_otp_secret(b"12345678901234567890");
        assert!(user.has_second_factor());
        assert_eq!(user.otp_secret_bytes().unwrap(), b"12345678901234567890".to_vec());
    }

    #[test]
    fn test_new_user_is_enabled_without_credentials() {
        let user = User::new("bob");
        assert!(user.enabled);
        assert!(user.password_hash.is_none());
        assert!(!user.has_second_factor());
    }
}
