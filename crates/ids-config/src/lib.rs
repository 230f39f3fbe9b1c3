//! Identity Server Configuration
//!
//! TOML-based configuration with environment variable override support.
//! Loaded once at startup; components receive immutable views of it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub mongodb: MongoConfig,
    pub store: StoreConfig,
    pub issuer: IssuerSettings,
    pub cleanup: CleanupSettings,
    pub seed: SeedSettings,

    /// Enable development mode
    pub dev_mode: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "identity".to_string(),
        }
    }
}

/// Store access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound for any single store call
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

/// Token issuer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerSettings {
    /// Value of the `iss` claim
    pub issuer_uri: String,
    /// Public base URL used in the discovery document
    pub external_base_url: String,
    pub access_token_lifetime_secs: i64,
    pub identity_token_lifetime_secs: i64,
    pub authorization_code_lifetime_secs: i64,
    pub refresh_token_lifetime_secs: i64,
    pub consent_lifetime_secs: i64,
    /// PEM files for a fixed signing key. Empty means load or generate under `key_dir`.
    pub private_key_path: String,
    pub public_key_path: String,
    /// Directory holding generated signing keys
    pub key_dir: String,
    /// Age after which a new signing key is generated (0 disables rotation)
    pub key_rotation_days: i64,
    /// How long a retired key stays valid for validation
    pub key_retention_days: i64,
    /// Clock skew tolerated when validating tokens
    pub clock_skew_secs: u64,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            issuer_uri: "http://localhost:5000".to_string(),
            external_base_url: "http://localhost:5000".to_string(),
            access_token_lifetime_secs: 3600,
            identity_token_lifetime_secs: 300,
            authorization_code_lifetime_secs: 300,
            refresh_token_lifetime_secs: 86400 * 30,
            consent_lifetime_secs: 86400 * 365,
            private_key_path: String::new(),
            public_key_path: String::new(),
            key_dir: ".signing-keys".to_string(),
            key_rotation_days: 90,
            key_retention_days: 14,
            clock_skew_secs: 60,
        }
    }
}

/// Expired grant cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Grants are kept this long past expiry before deletion
    pub grace_period_secs: i64,
    pub batch_size: u32,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            grace_period_secs: 300,
            batch_size: 500,
        }
    }
}

/// Fixture seeding (development only)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSettings {
    pub enabled: bool,
    /// TOML file describing clients, resources and users to load
    pub fixture_path: String,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let issuer = &self.issuer;
        if issuer.issuer_uri.trim().is_empty() {
            return Err(ConfigError::ValidationError("issuer.issuer_uri must be set".into()));
        }
        for (name, value) in [
            ("access_token_lifetime_secs", issuer.access_token_lifetime_secs),
            ("identity_token_lifetime_secs", issuer.identity_token_lifetime_secs),
            ("authorization_code_lifetime_secs", issuer.authorization_code_lifetime_secs),
            ("refresh_token_lifetime_secs", issuer.refresh_token_lifetime_secs),
        ] {
            if value <= 0 {
                return Err(ConfigError::ValidationError(format!("issuer.{} must be positive", name)));
            }
        }
        if issuer.private_key_path.is_empty() != issuer.public_key_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "issuer.private_key_path and issuer.public_key_path must be set together".into(),
            ));
        }
        if issuer.key_rotation_days < 0 || issuer.key_retention_days < 0 {
            return Err(ConfigError::ValidationError("key rotation/retention must not be negative".into()));
        }
        if self.store.timeout_ms == 0 {
            return Err(ConfigError::ValidationError("store.timeout_ms must be positive".into()));
        }
        if self.cleanup.enabled && (self.cleanup.interval_secs == 0 || self.cleanup.batch_size == 0) {
            return Err(ConfigError::ValidationError(
                "cleanup.interval_secs and cleanup.batch_size must be positive".into(),
            ));
        }
        if self.cleanup.grace_period_secs < 0 {
            return Err(ConfigError::ValidationError("cleanup.grace_period_secs must not be negative".into()));
        }
        if self.seed.enabled && self.seed.fixture_path.is_empty() {
            return Err(ConfigError::ValidationError("seed.fixture_path is required when seeding".into()));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Identity Server Configuration
# Environment variables (IDS_*) override these settings

dev_mode = false

[http]
port = 5000
host = "0.0.0.0"

[mongodb]
uri = "mongodb://localhost:27017"
database = "identity"

[store]
timeout_ms = 5000

[issuer]
issuer_uri = "https://id.example.com"
external_base_url = "https://id.example.com"
access_token_lifetime_secs = 3600
identity_token_lifetime_secs = 300
authorization_code_lifetime_secs = 300
refresh_token_lifetime_secs = 2592000
consent_lifetime_secs = 31536000
key_dir = ".signing-keys"
key_rotation_days = 90
key_retention_days = 14
clock_skew_secs = 60

[cleanup]
enabled = true
interval_secs = 3600
grace_period_secs = 300
batch_size = 500

[seed]
enabled = false
fixture_path = ""
"#
        .to_string()
    }
}
