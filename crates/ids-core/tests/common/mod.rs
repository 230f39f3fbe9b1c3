#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use ids_core::idp::{ExternalAuth, ExternalIdentity, ExternalProviders};
use ids_core::protocol::pkce;
use ids_core::{
    Argon2Config, AuthError, AuthorizeRequest, ClientCredentials, CredentialService, DevDataSeeder, EngineConfig,
    InMemoryGrantStore, InMemoryRegistry, InMemoryUserStore, IssuerConfig, KeyRing, KeyRingConfig, PasswordService,
    ProtocolEngine, SigningKey, TokenIssuer, TokenParams, TokenResult, TokenValidator, User, UserStore,
};

pub const ISSUER: &str = "https://id.example.com";
pub const KEY_1: &str = include_str!("../fixtures/signing_key_1.pem");
pub const PUB_1: &str = include_str!("../fixtures/signing_key_1.pub.pem");

pub const WEB_REDIRECT: &str = "https://app/cb";
pub const SPA_REDIRECT: &str = "https://spa/cb";
/// RFC 7636 appendix B verifier
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub struct TestServer {
    pub engine: Arc<ProtocolEngine>,
    pub registry: Arc<InMemoryRegistry>,
    pub users: Arc<InMemoryUserStore>,
    pub grants: Arc<InMemoryGrantStore>,
    pub issuer: Arc<TokenIssuer>,
    pub validator: Arc<TokenValidator>,
}

pub async fn setup() -> TestServer {
    setup_with(EngineConfig::default(), ExternalProviders::new()).await
}

pub async fn setup_with(config: EngineConfig, providers: ExternalProviders) -> TestServer {
    let registry = Arc::new(InMemoryRegistry::new());
    let users = Arc::new(InMemoryUserStore::new());
    let grants = Arc::new(InMemoryGrantStore::new());
    let passwords = Arc::new(PasswordService::new(Argon2Config::testing()).unwrap());

    DevDataSeeder::new(registry.clone(), registry.clone(), users.clone(), passwords.clone())
        .seed_from_file(&fixture_path("test_seed.toml"))
        .await
        .unwrap();

    let ring = Arc::new(KeyRing::new(
        SigningKey::from_pem(KEY_1, PUB_1, Utc::now()).unwrap(),
        KeyRingConfig::default(),
    ));
    let issuer = Arc::new(TokenIssuer::new(IssuerConfig::new(ISSUER), ring.clone()));
    let validator = Arc::new(TokenValidator::new(ISSUER, ring));
    let credentials = Arc::new(CredentialService::new(users.clone(), passwords, config.store_timeout).unwrap());

    let engine = ProtocolEngine::new(
        config,
        registry.clone(),
        registry.clone(),
        grants.clone(),
        credentials,
        issuer.clone(),
        validator.clone(),
    )
    .with_external_providers(providers);

    TestServer {
        engine: Arc::new(engine),
        registry,
        users,
        grants,
        issuer,
        validator,
    }
}

impl TestServer {
    pub async fn user(&self, username: &str) -> User {
        self.users.find_by_username(username).await.unwrap().unwrap()
    }

    /// Authorization code for `username` at the confidential web client
    pub async fn web_code(&self, username: &str, scope: &str) -> String {
        let user = self.user(username).await;
        let request = AuthorizeRequest::new("web_app", WEB_REDIRECT, scope).with_state("xyz");
        self.engine.authorize(&request, &user).await.unwrap().code
    }

    pub async fn redeem_web_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResult, AuthError> {
        let params = TokenParams {
            code: Some(code.to_string()),
            redirect_uri: Some(redirect_uri.to_string()),
            ..Default::default()
        };
        self.engine
            .request_token("authorization_code", &web_credentials(), &params)
            .await
    }

    pub async fn refresh(&self, refresh_token: &str, scope: Option<&str>) -> Result<TokenResult, AuthError> {
        let params = TokenParams {
            refresh_token: Some(refresh_token.to_string()),
            scope: scope.map(str::to_string),
            ..Default::default()
        };
        self.engine.request_token("refresh_token", &web_credentials(), &params).await
    }
}

pub fn web_credentials() -> ClientCredentials {
    ClientCredentials::new("web_app", Some("web-secret"))
}

pub fn game_credentials() -> ClientCredentials {
    ClientCredentials::new("game_client", Some("S"))
}

pub fn s256(verifier: &str) -> String {
    pkce::s256_challenge(verifier)
}

/// Provider that trusts a `sub` callback parameter
pub struct FakeProvider;

#[async_trait]
impl ExternalAuth for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn challenge_url(&self, state: &str, callback_uri: &str) -> String {
        format!(
            "https://idp.example.com/login?state={}&redirect_uri={}",
            state,
            urlencoding::encode(callback_uri)
        )
    }

    async fn authenticate(&self, callback_params: &HashMap<String, String>) -> Result<ExternalIdentity, AuthError> {
        let subject = callback_params
            .get("sub")
            .ok_or_else(|| AuthError::access_denied("missing subject"))?;
        Ok(ExternalIdentity {
            provider: "fake".to_string(),
            subject: subject.clone(),
            claims: [("email".to_string(), format!("{}@idp.example.com", subject))].into(),
        })
    }
}

pub fn fake_providers() -> ExternalProviders {
    ExternalProviders::new().with_provider(Arc::new(FakeProvider))
}
