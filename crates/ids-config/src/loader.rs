//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "identity.toml",
    "./config/config.toml",
    "./config/identity.toml",
    "/etc/identity-server/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable
    /// overrides, then validate it.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("IDS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `IDS_*` overrides using the given variable lookup.
fn apply_overrides<F>(config: &mut AppConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    let parse_into = |key: &str, target: &mut i64| {
        if let Some(val) = var(key).and_then(|v| v.parse().ok()) {
            *target = val;
        }
    };

    // HTTP
    if let Some(port) = var("IDS_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.http.port = port;
    }
    if let Some(val) = var("IDS_HTTP_HOST") {
        config.http.host = val;
    }

    // MongoDB
    if let Some(val) = var("IDS_MONGODB_URI") {
        config.mongodb.uri = val;
    }
    if let Some(val) = var("IDS_MONGODB_DATABASE") {
        config.mongodb.database = val;
    }

    // Store
    if let Some(ms) = var("IDS_STORE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.store.timeout_ms = ms;
    }

    // Issuer
    if let Some(val) = var("IDS_ISSUER_URI") {
        config.issuer.issuer_uri = val;
    }
    if let Some(val) = var("IDS_EXTERNAL_BASE_URL") {
        config.issuer.external_base_url = val;
    }
    parse_into("IDS_ACCESS_TOKEN_LIFETIME_SECS", &mut config.issuer.access_token_lifetime_secs);
    parse_into("IDS_REFRESH_TOKEN_LIFETIME_SECS", &mut config.issuer.refresh_token_lifetime_secs);
    parse_into("IDS_KEY_ROTATION_DAYS", &mut config.issuer.key_rotation_days);
    parse_into("IDS_KEY_RETENTION_DAYS", &mut config.issuer.key_retention_days);
    if let Some(val) = var("IDS_SIGNING_KEY_PRIVATE_PATH") {
        config.issuer.private_key_path = val;
    }
    if let Some(val) = var("IDS_SIGNING_KEY_PUBLIC_PATH") {
        config.issuer.public_key_path = val;
    }
    if let Some(val) = var("IDS_SIGNING_KEY_DIR") {
        config.issuer.key_dir = val;
    }

    // Cleanup
    if let Some(val) = var("IDS_CLEANUP_ENABLED") {
        config.cleanup.enabled = val.parse().unwrap_or(true);
    }
    if let Some(secs) = var("IDS_CLEANUP_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
        config.cleanup.interval_secs = secs;
    }
    parse_into("IDS_CLEANUP_GRACE_PERIOD_SECS", &mut config.cleanup.grace_period_secs);

    // Seed
    if let Some(val) = var("IDS_SEED_ENABLED") {
        config.seed.enabled = val.parse().unwrap_or(false);
    }
    if let Some(val) = var("IDS_SEED_FIXTURE_PATH") {
        config.seed.fixture_path = val;
    }

    // General
    if let Some(val) = var("IDS_DEV_MODE") {
        config.dev_mode = val.parse().unwrap_or(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_applied() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            lookup(&[
                ("IDS_HTTP_PORT", "8443"),
                ("IDS_ISSUER_URI", "https://login.example.org"),
                ("IDS_ACCESS_TOKEN_LIFETIME_SECS", "600"),
                ("IDS_CLEANUP_ENABLED", "false"),
            ]),
        );

        assert_eq!(config.http.port, 8443);
        assert_eq!(config.issuer.issuer_uri, "https://login.example.org");
        assert_eq!(config.issuer.access_token_lifetime_secs, 600);
        assert!(!config.cleanup.enabled);
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, lookup(&[("IDS_HTTP_PORT", "not-a-port")]));
        assert_eq!(config.http.port, 5000);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mongodb]\ndatabase = \"ids_test\"").unwrap();

        let config = ConfigLoader::with_path(file.path()).load().unwrap();
        assert_eq!(config.mongodb.database, "ids_test");
    }
}
