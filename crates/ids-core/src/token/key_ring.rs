//! Signing key ring.
//!
//! One active RSA key signs new tokens. When it is rotated out it stays
//! published and accepted for verification until its retention window
//! elapses, then it is pruned.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration as StdDuration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::shared::error::{AuthError, Result};

pub struct SigningKey {
    pub kid: String,
    pub created_at: DateTime<Utc>,
    /// Set once the key stops signing
    pub retired_at: Option<DateTime<Utc>>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    n: String,
    e: String,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .field("retired_at", &self.retired_at)
            .finish()
    }
}

impl SigningKey {
    pub fn from_pem(private_pem: &str, public_pem: &str, created_at: DateTime<Utc>) -> Result<Self> {
        use rsa::{pkcs8::DecodePublicKey, traits::PublicKeyParts, RsaPublicKey};

        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::internal(format!("Invalid RSA private key: {}", e)))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AuthError::internal(format!("Invalid RSA public key: {}", e)))?;
        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| AuthError::internal(format!("Failed to parse RSA public key: {}", e)))?;

        Ok(Self {
            kid: key_id(public_pem),
            created_at,
            retired_at: None,
            encoding,
            decoding,
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        })
    }

    /// Fresh RSA-2048 key pair as (private PKCS#8 PEM, public SPKI PEM)
    pub fn generate_pem() -> Result<(String, String)> {
        use argon2::password_hash::rand_core::OsRng;
        use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
        use rsa::{RsaPrivateKey, RsaPublicKey};

        info!("Generating RSA signing key (2048 bit)");
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| AuthError::internal(format!("Failed to generate RSA key: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::internal(format!("Failed to encode private key: {}", e)))?
            .to_string();
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::internal(format!("Failed to encode public key: {}", e)))?;

        Ok((private_pem, public_pem))
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            alg: "RS256".to_string(),
            kid: self.kid.clone(),
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }

    fn retired_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            kid: self.kid.clone(),
            created_at: self.created_at,
            retired_at: Some(at),
            encoding: self.encoding.clone(),
            decoding: self.decoding.clone(),
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }
}

/// base64url of the first 6 bytes of SHA-256 over the public key PEM
fn key_id(public_pem: &str) -> String {
    let hash = Sha256::digest(public_pem.as_bytes());
    URL_SAFE_NO_PAD.encode(&hash[..6])
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone)]
pub struct KeyRingConfig {
    /// Age at which the active key is replaced
    pub rotation_period: Duration,
    /// How long a retired key is still accepted
    pub retention: Duration,
    /// Where generated keys are persisted, if anywhere
    pub key_dir: Option<PathBuf>,
    /// Off for externally managed keys
    pub auto_rotate: bool,
}

impl Default for KeyRingConfig {
    fn default() -> Self {
        Self {
            rotation_period: Duration::days(90),
            retention: Duration::days(14),
            key_dir: None,
            auto_rotate: true,
        }
    }
}

struct RingState {
    active: Arc<SigningKey>,
    retired: Vec<Arc<SigningKey>>,
}

pub struct KeyRing {
    state: RwLock<RingState>,
    config: KeyRingConfig,
}

impl KeyRing {
    pub fn new(active: SigningKey, config: KeyRingConfig) -> Self {
        Self {
            state: RwLock::new(RingState {
                active: Arc::new(active),
                retired: Vec::new(),
            }),
            config,
        }
    }

    /// Ring holding a single key from explicit PEM files. Such keys are
    /// managed externally and are not rotated.
    pub fn from_pem_files(private_path: &Path, public_path: &Path, config: KeyRingConfig) -> Result<Self> {
        let private_pem = fs::read_to_string(private_path)
            .map_err(|e| AuthError::internal(format!("Cannot read {}: {}", private_path.display(), e)))?;
        let public_pem = fs::read_to_string(public_path)
            .map_err(|e| AuthError::internal(format!("Cannot read {}: {}", public_path.display(), e)))?;
        let key = SigningKey::from_pem(&private_pem, &public_pem, Utc::now())?;
        info!(kid = %key.kid, "Loaded signing key from configured paths");
        Ok(Self::new(
            key,
            KeyRingConfig {
                key_dir: None,
                auto_rotate: false,
                ..config
            },
        ))
    }

    /// Load every persisted key from `config.key_dir`, newest active, or
    /// generate and persist a first key when the directory is empty.
    pub fn load_or_generate(config: KeyRingConfig) -> Result<Self> {
        let Some(dir) = config.key_dir.clone() else {
            let (private_pem, public_pem) = SigningKey::generate_pem()?;
            warn!("No key directory configured; signing key is ephemeral");
            return Ok(Self::new(SigningKey::from_pem(&private_pem, &public_pem, Utc::now())?, config));
        };

        let mut keys = load_key_dir(&dir)?;
        keys.sort_by_key(|k| k.created_at);

        let Some(newest) = keys.pop() else {
            let now = Utc::now();
            let key = generate_and_persist(&dir, now)?;
            return Ok(Self::new(key, config));
        };

        // Each older key was retired when its successor was created
        let mut retired = Vec::with_capacity(keys.len());
        let successors: Vec<DateTime<Utc>> = keys
            .iter()
            .skip(1)
            .map(|k| k.created_at)
            .chain(std::iter::once(newest.created_at))
            .collect();
        for (key, retired_at) in keys.into_iter().zip(successors) {
            retired.push(Arc::new(key.retired_at(retired_at)));
        }

        info!(kid = %newest.kid, retired = retired.len(), "Loaded signing keys from {}", dir.display());
        let ring = Self {
            state: RwLock::new(RingState {
                active: Arc::new(newest),
                retired,
            }),
            config,
        };
        ring.prune(Utc::now());
        Ok(ring)
    }

    fn read(&self) -> RwLockReadGuard<'_, RingState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RingState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The key used for new tokens
    pub fn signing_key(&self) -> Arc<SigningKey> {
        self.read().active.clone()
    }

    /// Key accepted for verification at `now`, by kid
    pub fn verification_key(&self, kid: &str, now: DateTime<Utc>) -> Option<Arc<SigningKey>> {
        let state = self.read();
        if state.active.kid == kid {
            return Some(state.active.clone());
        }
        state
            .retired
            .iter()
            .find(|k| k.kid == kid && !self.is_past_retention(k, now))
            .cloned()
    }

    fn is_past_retention(&self, key: &SigningKey, now: DateTime<Utc>) -> bool {
        key.retired_at.is_some_and(|at| now >= at + self.config.retention)
    }

    /// Published key set: active key first, then retired keys still in retention
    pub fn jwks(&self) -> Jwks {
        let now = Utc::now();
        let state = self.read();
        let keys = std::iter::once(&state.active)
            .chain(state.retired.iter().filter(|k| !self.is_past_retention(k, now)))
            .map(|k| k.jwk())
            .collect();
        Jwks { keys }
    }

    /// Make `key` the active key; the previous one is retired at `now`.
    pub fn rotate_to(&self, key: SigningKey, now: DateTime<Utc>) {
        let mut state = self.write();
        let previous = state.active.retired_at(now);
        info!(old_kid = %previous.kid, new_kid = %key.kid, "Rotated signing key");
        state.retired.push(Arc::new(previous));
        state.active = Arc::new(key);
    }

    /// Generate a new key (persisted when a key directory is set) and rotate to it.
    pub fn rotate(&self, now: DateTime<Utc>) -> Result<()> {
        let key = match &self.config.key_dir {
            Some(dir) => generate_and_persist(dir, now)?,
            None => {
                let (private_pem, public_pem) = SigningKey::generate_pem()?;
                SigningKey::from_pem(&private_pem, &public_pem, now)?
            }
        };
        self.rotate_to(key, now);
        Ok(())
    }

    /// Rotate when the active key has reached the rotation period.
    /// Never rotates a ring whose keys are managed externally.
    pub fn rotate_if_due(&self, now: DateTime<Utc>) -> Result<bool> {
        if !self.config.auto_rotate {
            return Ok(false);
        }
        let created_at = self.read().active.created_at;
        if now - created_at < self.config.rotation_period {
            return Ok(false);
        }
        self.rotate(now)?;
        Ok(true)
    }

    /// Drop retired keys whose retention has elapsed; returns how many.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.write();
        let mut expired = Vec::new();
        state.retired.retain(|k| {
            let keep = !k.retired_at.is_some_and(|at| now >= at + self.config.retention);
            if !keep {
                expired.push(k.created_at);
            }
            keep
        });
        drop(state);

        if let Some(dir) = &self.config.key_dir {
            for created_at in &expired {
                remove_persisted(dir, *created_at);
            }
        }
        if !expired.is_empty() {
            debug!(pruned = expired.len(), "Pruned retired signing keys");
        }
        expired.len()
    }

    /// Periodically rotate and prune until `shutdown` flips to true.
    pub async fn run_rotation(self: Arc<Self>, check_interval: StdDuration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    if let Err(e) = self.rotate_if_due(now) {
                        error!(error = %e, "Signing key rotation failed");
                    }
                    self.prune(now);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

fn private_path(dir: &Path, created_at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("{}.key.pem", created_at.timestamp()))
}

fn public_path(dir: &Path, created_at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("{}.pub.pem", created_at.timestamp()))
}

fn generate_and_persist(dir: &Path, now: DateTime<Utc>) -> Result<SigningKey> {
    let (private_pem, public_pem) = SigningKey::generate_pem()?;
    let key = SigningKey::from_pem(&private_pem, &public_pem, now)?;

    fs::create_dir_all(dir)
        .map_err(|e| AuthError::internal(format!("Could not create key directory: {}", e)))?;
    fs::write(private_path(dir, now), &private_pem)
        .map_err(|e| AuthError::internal(format!("Could not persist private key: {}", e)))?;
    fs::write(public_path(dir, now), &public_pem)
        .map_err(|e| AuthError::internal(format!("Could not persist public key: {}", e)))?;

    info!(kid = %key.kid, "Persisted signing key to {}", dir.display());
    Ok(key)
}

fn remove_persisted(dir: &Path, created_at: DateTime<Utc>) {
    for path in [private_path(dir, created_at), public_path(dir, created_at)] {
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "Could not remove expired signing key");
        }
    }
}

fn load_key_dir(dir: &Path) -> Result<Vec<SigningKey>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir)
        .map_err(|e| AuthError::internal(format!("Cannot read key directory: {}", e)))?;

    let mut keys = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(stamp) = file_name.strip_suffix(".key.pem") else {
            continue;
        };
        let Some(created_at) = stamp.parse::<i64>().ok().and_then(|s| Utc.timestamp_opt(s, 0).single()) else {
            warn!(file = %file_name, "Ignoring key file with unexpected name");
            continue;
        };

        let private_pem = fs::read_to_string(entry.path());
        let public_pem = fs::read_to_string(public_path(dir, created_at));
        match (private_pem, public_pem) {
            (Ok(private_pem), Ok(public_pem)) => keys.push(SigningKey::from_pem(&private_pem, &public_pem, created_at)?),
            _ => warn!(file = %file_name, "Ignoring key without a readable pair"),
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_1: &str = include_str!("../../tests/fixtures/signing_key_1.pem");
    const PUB_1: &str = include_str!("../../tests/fixtures/signing_key_1.pub.pem");
    const KEY_2: &str = include_str!("../../tests/fixtures/signing_key_2.pem");
    const PUB_2: &str = include_str!("../../tests/fixtures/signing_key_2.pub.pem");

    fn ring() -> KeyRing {
        KeyRing::new(
            SigningKey::from_pem(KEY_1, PUB_1, Utc::now()).unwrap(),
            KeyRingConfig::default(),
        )
    }

    #[test]
    fn test_jwk_components() {
        let key = SigningKey::from_pem(KEY_1, PUB_1, Utc::now()).unwrap();
        let jwk = key.jwk();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.e, "AQAB");
        assert_eq!(jwk.kid.len(), 8);
    }

    #[test]
    fn test_rotation_keeps_old_key_for_verification() {
        let ring = ring();
        let old_kid = ring.signing_key().kid.clone();
        let now = Utc::now();

        ring.rotate_to(SigningKey::from_pem(KEY_2, PUB_2, now).unwrap(), now);

        assert_ne!(ring.signing_key().kid, old_kid);
        assert!(ring.verification_key(&old_kid, now).is_some());
        assert_eq!(ring.jwks().keys.len(), 2);
        assert_eq!(ring.jwks().keys[0].kid, ring.signing_key().kid);
    }

    #[test]
    fn test_retired_key_expires_after_retention() {
        let ring = ring();
        let old_kid = ring.signing_key().kid.clone();
        let now = Utc::now();
        ring.rotate_to(SigningKey::from_pem(KEY_2, PUB_2, now).unwrap(), now);

        let later = now + Duration::days(15);
        assert!(ring.verification_key(&old_kid, later).is_none());
        assert_eq!(ring.prune(later), 1);
        assert_eq!(ring.jwks().keys.len(), 1);
    }

    #[test]
    fn test_rotate_if_due() {
        let ring = ring();
        assert!(!ring.rotate_if_due(Utc::now()).unwrap());
    }

    #[test]
    fn test_unknown_kid() {
        assert!(ring().verification_key("nope", Utc::now()).is_none());
    }

    fn persist(dir: &Path, private_pem: &str, public_pem: &str, created_at: DateTime<Utc>) {
        fs::write(private_path(dir, created_at), private_pem).unwrap();
        fs::write(public_path(dir, created_at), public_pem).unwrap();
    }

    fn whole_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
        Utc.timestamp_opt(at.timestamp(), 0).single().unwrap()
    }

    #[test]
    fn test_load_key_dir_newest_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let now = whole_seconds(Utc::now());
        persist(dir.path(), KEY_1, PUB_1, now - Duration::days(10));
        persist(dir.path(), KEY_2, PUB_2, now - Duration::days(1));

        let ring = KeyRing::load_or_generate(KeyRingConfig {
            key_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        let newest = SigningKey::from_pem(KEY_2, PUB_2, now).unwrap();
        let older = SigningKey::from_pem(KEY_1, PUB_1, now).unwrap();
        assert_eq!(ring.signing_key().kid, newest.kid);
        assert!(ring.verification_key(&older.kid, now).is_some());
        assert_eq!(ring.jwks().keys.len(), 2);
    }

    #[test]
    fn test_load_key_dir_prunes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let now = whole_seconds(Utc::now());
        let stale_at = now - Duration::days(40);
        persist(dir.path(), KEY_1, PUB_1, stale_at);
        persist(dir.path(), KEY_2, PUB_2, now - Duration::days(20));

        let ring = KeyRing::load_or_generate(KeyRingConfig {
            key_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(ring.jwks().keys.len(), 1);
        assert!(!private_path(dir.path(), stale_at).exists());
        assert!(!public_path(dir.path(), stale_at).exists());
    }

    #[test]
    fn test_from_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("private.pem");
        let public = dir.path().join("public.pem");
        fs::write(&private, KEY_1).unwrap();
        fs::write(&public, PUB_1).unwrap();

        let ring = KeyRing::from_pem_files(&private, &public, KeyRingConfig::default()).unwrap();
        assert_eq!(ring.signing_key().kid, SigningKey::from_pem(KEY_1, PUB_1, Utc::now()).unwrap().kid);
        assert!(KeyRing::from_pem_files(&dir.path().join("missing.pem"), &public, KeyRingConfig::default()).is_err());
    }

    #[test]
    fn test_pem_file_ring_never_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("private.pem");
        let public = dir.path().join("public.pem");
        fs::write(&private, KEY_1).unwrap();
        fs::write(&public, PUB_1).unwrap();

        let ring = KeyRing::from_pem_files(&private, &public, KeyRingConfig::default()).unwrap();
        let kid = ring.signing_key().kid.clone();

        assert!(!ring.rotate_if_due(Utc::now() + Duration::days(365)).unwrap());
        assert_eq!(ring.signing_key().kid, kid);
        assert_eq!(ring.jwks().keys.len(), 1);
    }
}
