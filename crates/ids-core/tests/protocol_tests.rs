//! End-to-end protocol scenarios against the in-memory stores.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::*;
use ids_core::grant::{CleanupConfig, Grant, GrantCleanupTask, GrantStore};
use ids_core::idp::{ExternalAuth, ExternalIdentity};
use ids_core::registry::ClientStore;
use ids_core::shared::store::{StoreError, StoreResult};
use ids_core::{
    Argon2Config, AuthError, AuthorizeRequest, ClientCredentials, ConsentDecision, CredentialService, EngineConfig,
    InMemoryUserStore, PasswordService, RefreshTokenUsage, TokenParams, TokenRequirement, Totp, User, UserStore,
};
use ids_core::user::ExternalLogin;

fn client_credentials_params(scope: Option<&str>) -> TokenParams {
    TokenParams {
        scope: scope.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_client_credentials_scope_and_audience() {
    let server = setup().await;

    let result = server
        .engine
        .request_token("client_credentials", &game_credentials(), &client_credentials_params(Some("game_api")))
        .await
        .unwrap();
    assert_eq!(result.scope, "game_api");
    assert_eq!(result.token_type, "Bearer");
    assert!(result.refresh_token.is_none());
    assert!(result.id_token.is_none());

    let claims = server
        .validator
        .validate(&result.access_token, &TokenRequirement::audience("game_api"))
        .unwrap();
    assert_eq!(claims.scope, "game_api");
    assert_eq!(claims.client_id, "game_client");
    assert_eq!(claims.iss, ISSUER);

    let err = server
        .validator
        .validate(&result.access_token, &TokenRequirement::audience("other_api"))
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized { .. }));
}

#[tokio::test]
async fn test_client_credentials_defaults_to_allowed_scopes() {
    let server = setup().await;
    let result = server
        .engine
        .request_token("client_credentials", &game_credentials(), &client_credentials_params(None))
        .await
        .unwrap();
    assert_eq!(result.scope, "game_api");
}

#[tokio::test]
async fn test_client_credentials_rejections() {
    let server = setup().await;
    let engine = &server.engine;

    let wrong_secret = ClientCredentials::new("game_client", Some("not-S"));
    let err = engine
        .request_token("client_credentials", &wrong_secret, &client_credentials_params(None))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidClient { .. }));

    let err = engine
        .request_token("client_credentials", &game_credentials(), &client_credentials_params(Some("other_api")))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidScope { .. }));

    let err = engine
        .request_token("password", &game_credentials(), &client_credentials_params(None))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UnsupportedGrantType { .. }));

    // Grant type not registered for the client
    let err = engine
        .request_token("authorization_code", &game_credentials(), &TokenParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidClient { .. }));
}

#[tokio::test]
async fn test_authorization_code_flow_issues_identity_token() {
    let server = setup().await;
    let alice = server.user("alice").await;
    let code = server.web_code("alice", "openid profile game_api").await;

    let result = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap();
    assert!(result.id_token.is_some());
    assert!(result.refresh_token.is_none());
    assert_eq!(result.scope, "game_api openid profile");

    let claims = server
        .validator
        .validate(&result.access_token, &TokenRequirement::audience("game_api").with_scope("game_api"))
        .unwrap();
    assert_eq!(claims.sub, alice.id);
    assert!(claims.has_user_subject());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_code_redemption_has_one_winner() {
    let server = Arc::new(setup().await);
    let code = server.web_code("alice", "openid game_api offline_access").await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let server = server.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move { server.redeem_web_code(&code, WEB_REDIRECT).await }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert!(matches!(err, AuthError::InvalidGrant { .. }), "unexpected error: {err:?}"),
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_redirect_mismatch_leaves_code_usable() {
    let server = setup().await;
    let code = server.web_code("alice", "game_api").await;

    let err = server.redeem_web_code(&code, "https://app/cb2").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));

    assert!(server.redeem_web_code(&code, WEB_REDIRECT).await.is_ok());
}

#[tokio::test]
async fn test_expired_code_is_never_redeemable() {
    let server = setup().await;
    let mut client = server.registry.find_enabled_client("web_app").await.unwrap().unwrap();
    client.authorization_code_lifetime_secs = Some(0);
    server.registry.update(&client).await.unwrap();

    let code = server.web_code("alice", "game_api").await;
    let err = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}

#[tokio::test]
async fn test_code_replay_revokes_refresh_tokens() {
    let server = setup().await;
    let code = server.web_code("alice", "openid game_api offline_access").await;

    let first = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap();
    let refresh_token = first.refresh_token.expect("offline_access grants a refresh token");

    let err = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));

    let err = server.refresh(&refresh_token, None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}

#[tokio::test]
async fn test_pkce_for_public_client() {
    let server = setup().await;
    let alice = server.user("alice").await;
    let spa = ClientCredentials::new("spa", None);

    let err = server
        .engine
        .authorize(&AuthorizeRequest::new("spa", SPA_REDIRECT, "openid game_api"), &alice)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest { .. }));

    let plain = AuthorizeRequest::new("spa", SPA_REDIRECT, "openid game_api").with_pkce(VERIFIER, "plain");
    let err = server.engine.authorize(&plain, &alice).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest { .. }));

    let request = AuthorizeRequest::new("spa", SPA_REDIRECT, "openid game_api")
        .with_pkce(s256(VERIFIER), "S256")
        .with_nonce("n-0S6_WzA2Mj");
    let code = server.engine.authorize(&request, &alice).await.unwrap().code;

    let mut params = TokenParams {
        code: Some(code),
        redirect_uri: Some(SPA_REDIRECT.to_string()),
        code_verifier: Some("x".repeat(43)),
        ..Default::default()
    };
    let err = server
        .engine
        .request_token("authorization_code", &spa, &params)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));

    // A failed verifier does not consume the code
    params.code_verifier = Some(VERIFIER.to_string());
    let result = server.engine.request_token("authorization_code", &spa, &params).await.unwrap();
    assert!(result.id_token.is_some());
}

#[tokio::test]
async fn test_refresh_rotation_and_replay() {
    let server = setup().await;
    let code = server.web_code("alice", "openid game_api offline_access").await;
    let first = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap();
    let r1 = first.refresh_token.unwrap();

    let second = server.refresh(&r1, None).await.unwrap();
    let r2 = second.refresh_token.unwrap();
    assert_ne!(r1, r2);
    assert!(second.id_token.is_some());

    // Replaying the rotated token revokes the whole lineage
    let err = server.refresh(&r1, None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
    let err = server.refresh(&r2, None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}

#[tokio::test]
async fn test_refresh_scope_narrowing() {
    let server = setup().await;
    let code = server.web_code("alice", "openid game_api offline_access").await;
    let r1 = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap().refresh_token.unwrap();

    let err = server.refresh(&r1, Some("game_api profile")).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidScope { .. }));

    let narrowed = server.refresh(&r1, Some("game_api")).await.unwrap();
    assert_eq!(narrowed.scope, "game_api");
    assert!(narrowed.id_token.is_none());

    // The rotated token still carries the original grant
    let r2 = narrowed.refresh_token.unwrap();
    let widened_back = server.refresh(&r2, None).await.unwrap();
    assert_eq!(widened_back.scope, "game_api offline_access openid");
}

#[tokio::test]
async fn test_withdrawn_client_scope_ends_outstanding_grants() {
    let server = setup().await;
    let pending_code = server.web_code("alice", "openid game_api").await;
    let code = server.web_code("alice", "openid game_api offline_access").await;
    let refresh_token = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap().refresh_token.unwrap();

    let mut client = server.registry.find_enabled_client("web_app").await.unwrap().unwrap();
    client.allowed_scopes.remove("game_api");
    server.registry.update(&client).await.unwrap();

    let err = server.refresh(&refresh_token, None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
    let err = server.refresh(&refresh_token, Some("openid")).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
    let err = server.redeem_web_code(&pending_code, WEB_REDIRECT).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));

    // Grants within the remaining scopes still work
    let code = server.web_code("alice", "openid offline_access").await;
    let result = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap();
    assert!(server.refresh(&result.refresh_token.unwrap(), None).await.is_ok());
}

#[tokio::test]
async fn test_reuse_refresh_token_keeps_handle() {
    let server = setup().await;
    let client = server.registry.find_enabled_client("web_app").await.unwrap().unwrap();
    server
        .registry
        .update(&client.with_refresh_token_usage(RefreshTokenUsage::ReUse))
        .await
        .unwrap();

    let code = server.web_code("alice", "game_api offline_access").await;
    let r1 = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap().refresh_token.unwrap();

    assert_eq!(server.refresh(&r1, None).await.unwrap().refresh_token.as_deref(), Some(r1.as_str()));
    assert_eq!(server.refresh(&r1, None).await.unwrap().refresh_token.as_deref(), Some(r1.as_str()));
}

#[tokio::test]
async fn test_disabled_user_cannot_redeem_or_refresh() {
    let server = setup().await;
    let alice = server.user("alice").await;
    let code = server.web_code("alice", "game_api offline_access").await;
    let r1 = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap().refresh_token.unwrap();

    let code = server.web_code("alice", "game_api").await;
    assert!(server.users.set_enabled(&alice.id, false).await.unwrap());

    let err = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
    let err = server.refresh(&r1, None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}

#[tokio::test]
async fn test_consent_flow() {
    let server = setup().await;
    let alice = server.user("alice").await;
    let base = AuthorizeRequest::new("consent_app", "https://consent/cb", "openid game_api");

    let err = server.engine.authorize(&base, &alice).await.unwrap_err();
    assert!(matches!(err, AuthError::ConsentRequired));

    let denied = base.clone().with_consent(ConsentDecision::Denied, false);
    let err = server.engine.authorize(&denied, &alice).await.unwrap_err();
    assert!(matches!(err, AuthError::AccessDenied { .. }));

    let granted = base.clone().with_consent(ConsentDecision::Granted, true);
    assert!(server.engine.authorize(&granted, &alice).await.is_ok());

    // Remembered consent covers the same scopes
    assert!(server.engine.authorize(&base, &alice).await.is_ok());

    assert!(server.engine.revoke_consent(&alice.id, "consent_app").await.unwrap());
    let err = server.engine.authorize(&base, &alice).await.unwrap_err();
    assert!(matches!(err, AuthError::ConsentRequired));
}

#[tokio::test]
async fn test_authorize_rejects_unregistered_redirect_and_scope() {
    let server = setup().await;
    let alice = server.user("alice").await;

    let err = server
        .engine
        .authorize(&AuthorizeRequest::new("web_app", "https://evil/cb", "game_api"), &alice)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest { .. }));

    let err = server
        .engine
        .authorize(&AuthorizeRequest::new("web_app", WEB_REDIRECT, "other_api"), &alice)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidScope { .. }));

    let err = server
        .engine
        .authorize(&AuthorizeRequest::new("game_client", WEB_REDIRECT, "game_api"), &alice)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest { .. }));
}

#[tokio::test]
async fn test_second_factor_codes_are_single_use() {
    let server = setup().await;
    let bob = server.user("bob").await;
    let secret = bob.otp_secret_bytes().unwrap();
    let totp = Totp::default();
    let credentials = server.engine.credentials();

    let now = 1_700_000_000;
    let code = totp.code_at(&secret, now).unwrap();
    assert!(credentials.verify_second_factor_at(&bob, &code, now).await.unwrap());
    assert!(!credentials.verify_second_factor_at(&bob, &code, now).await.unwrap());

    let next = totp.code_at(&secret, now + 30).unwrap();
    assert!(credentials.verify_second_factor_at(&bob, &next, now + 30).await.unwrap());

    // Far outside the window
    let late = totp.code_at(&secret, now + 600).unwrap();
    assert!(!credentials.verify_second_factor_at(&bob, &late, now + 30).await.unwrap());

    let err = credentials.authenticate("bob", "bob-password", None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    let err = credentials.authenticate("bob", "wrong", None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_unknown_user_and_wrong_password_look_alike() {
    let server = setup().await;
    let credentials = server.engine.credentials();

    let unknown = credentials.authenticate("mallory", "x", None).await.unwrap_err();
    let wrong = credentials.authenticate("alice", "x", None).await.unwrap_err();
    assert_eq!(unknown.to_string(), wrong.to_string());
    assert!(credentials.authenticate("alice", "alice-password", None).await.is_ok());
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_grants() {
    let server = setup().await;
    let code = server.web_code("alice", "game_api offline_access").await;
    let refresh_token = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap().refresh_token.unwrap();

    let stale = Grant::refresh_token(
        "stale-handle",
        "someone",
        "web_app",
        ["game_api".to_string()].into(),
        "stale-lineage",
        chrono::Duration::hours(-1),
    );
    server.grants.store(&stale).await.unwrap();

    let task = GrantCleanupTask::new(
        server.grants.clone(),
        CleanupConfig {
            grace_period: Duration::ZERO,
            ..Default::default()
        },
    );
    assert_eq!(task.run_once().await, 1);

    // The consumed code is kept until it expires
    assert_eq!(server.grants.len(), 2);
    assert!(server.refresh(&refresh_token, None).await.is_ok());
}

#[tokio::test]
async fn test_revoke_token() {
    let server = setup().await;
    let code = server.web_code("alice", "game_api offline_access").await;
    let r1 = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap().refresh_token.unwrap();

    // Another client's request is accepted but has no effect
    server.engine.revoke_token(&game_credentials(), &r1, None).await.unwrap();
    server.engine.revoke_token(&web_credentials(), "no-such-token", None).await.unwrap();
    let r2 = server.refresh(&r1, None).await.unwrap().refresh_token.unwrap();

    server
        .engine
        .revoke_token(&web_credentials(), &r2, Some("refresh_token"))
        .await
        .unwrap();
    let err = server.refresh(&r2, None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));

    let err = server
        .engine
        .revoke_token(&ClientCredentials::new("web_app", Some("bad")), &r2, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidClient { .. }));
}

#[tokio::test]
async fn test_user_info() {
    let server = setup().await;
    let alice = server.user("alice").await;
    let code = server.web_code("alice", "openid email").await;
    let result = server.redeem_web_code(&code, WEB_REDIRECT).await.unwrap();

    let info = server.engine.user_info(&result.access_token).await.unwrap();
    assert_eq!(info.get("sub").and_then(|v| v.as_str()), Some(alice.id.as_str()));
    assert_eq!(info.get("email").and_then(|v| v.as_str()), Some("alice@example.com"));
    // Not granted
    assert!(!info.contains_key("name"));

    let client_token = server
        .engine
        .request_token("client_credentials", &game_credentials(), &client_credentials_params(None))
        .await
        .unwrap();
    let err = server.engine.user_info(&client_token.access_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized { .. }));
}

#[tokio::test]
async fn test_external_login_links_once() {
    let server = setup_with(EngineConfig::default(), fake_providers()).await;
    let identity = ExternalIdentity {
        provider: "fake".to_string(),
        subject: "ext-42".to_string(),
        claims: [("email".to_string(), "ext@idp.example.com".to_string())].into(),
    };

    let first = server.engine.external_login(&identity).await.unwrap();
    let second = server.engine.external_login(&identity).await.unwrap();
    assert_eq!(first.id, second.id);
    assert!(first.password_hash.is_none());
    assert_eq!(first.claims.get("email").map(String::as_str), Some("ext@idp.example.com"));

    server.users.set_enabled(&first.id, false).await.unwrap();
    let err = server.engine.external_login(&identity).await.unwrap_err();
    assert!(matches!(err, AuthError::AccessDenied { .. }));

    let callback: HashMap<String, String> = [("sub".to_string(), "ext-7".to_string())].into();
    let provider = server.engine.external_providers().get("fake").unwrap();
    let identity = provider.authenticate(&callback).await.unwrap();
    assert_eq!(identity.subject, "ext-7");
}

/// User store whose first link write fails after the user insert landed
struct FlakyLinks {
    inner: InMemoryUserStore,
    fail_next_link: AtomicBool,
}

#[async_trait]
impl UserStore for FlakyLinks {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.inner.find_by_username(username).await
    }

    async fn insert(&self, user: &User) -> StoreResult<()> {
        self.inner.insert(user).await
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        self.inner.update(user).await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> StoreResult<bool> {
        self.inner.set_enabled(id, enabled).await
    }

    async fn advance_otp_step(&self, id: &str, step: i64) -> StoreResult<bool> {
        self.inner.advance_otp_step(id, step).await
    }

    async fn find_by_external_login(&self, provider: &str, subject: &str) -> StoreResult<Option<User>> {
        self.inner.find_by_external_login(provider, subject).await
    }

    async fn link_external_login(&self, login: &ExternalLogin) -> StoreResult<()> {
        if self.fail_next_link.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.link_external_login(login).await
    }
}

#[tokio::test]
async fn test_external_login_recovers_from_failed_link() {
    let server = setup().await;
    let users = Arc::new(FlakyLinks {
        inner: InMemoryUserStore::new(),
        fail_next_link: AtomicBool::new(true),
    });
    let passwords = Arc::new(PasswordService::new(Argon2Config::testing()).unwrap());
    let credentials = Arc::new(CredentialService::new(users.clone(), passwords, Duration::from_secs(5)).unwrap());
    let engine = ids_core::ProtocolEngine::new(
        EngineConfig::default(),
        server.registry.clone(),
        server.registry.clone(),
        server.grants.clone(),
        credentials,
        server.issuer.clone(),
        server.validator.clone(),
    );
    let identity = ExternalIdentity {
        provider: "fake".to_string(),
        subject: "ext-9".to_string(),
        claims: Default::default(),
    };

    let err = engine.external_login(&identity).await.unwrap_err();
    assert!(matches!(err, AuthError::StoreUnavailable));
    let orphan = users.find_by_username("fake:ext-9").await.unwrap().unwrap();

    let user = engine.external_login(&identity).await.unwrap();
    assert_eq!(user.id, orphan.id);
    let again = engine.external_login(&identity).await.unwrap();
    assert_eq!(again.id, orphan.id);
}

#[tokio::test]
async fn test_external_login_never_adopts_local_account() {
    let server = setup_with(EngineConfig::default(), fake_providers()).await;
    let passwords = PasswordService::new(Argon2Config::testing()).unwrap();
    let local = User::new("fake:ext-local").with_password_hash(passwords.hash_password("pw").unwrap());
    server.users.insert(&local).await.unwrap();

    let identity = ExternalIdentity {
        provider: "fake".to_string(),
        subject: "ext-local".to_string(),
        claims: Default::default(),
    };
    let err = server.engine.external_login(&identity).await.unwrap_err();
    assert!(matches!(err, AuthError::Internal { .. }));
    assert!(server.users.find_by_external_login("fake", "ext-local").await.unwrap().is_none());
}

/// Grant store whose calls never complete
struct StalledGrants;

#[async_trait]
impl GrantStore for StalledGrants {
    async fn store(&self, _grant: &Grant) -> StoreResult<()> {
        std::future::pending().await
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<Grant>> {
        std::future::pending().await
    }

    async fn try_consume(&self, _key: &str, _now: DateTime<Utc>) -> StoreResult<bool> {
        std::future::pending().await
    }

    async fn revoke(&self, _key: &str, _now: DateTime<Utc>) -> StoreResult<bool> {
        std::future::pending().await
    }

    async fn revoke_lineage(&self, _lineage: &str, _now: DateTime<Utc>) -> StoreResult<u64> {
        std::future::pending().await
    }

    async fn find_consent(&self, _subject: &str, _client_id: &str) -> StoreResult<Option<Grant>> {
        std::future::pending().await
    }

    async fn remove_consent(&self, _subject: &str, _client_id: &str) -> StoreResult<bool> {
        std::future::pending().await
    }

    async fn remove_expired(&self, _cutoff: DateTime<Utc>, _limit: usize) -> StoreResult<u64> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_store_reports_unavailable() {
    let server = setup().await;
    let engine = ids_core::ProtocolEngine::new(
        EngineConfig {
            store_timeout: Duration::from_millis(50),
            ..Default::default()
        },
        server.registry.clone(),
        server.registry.clone(),
        Arc::new(StalledGrants),
        server.engine.credentials().clone(),
        server.issuer.clone(),
        server.validator.clone(),
    );

    let params = TokenParams {
        code: Some("anything".to_string()),
        redirect_uri: Some(WEB_REDIRECT.to_string()),
        ..Default::default()
    };
    let err = engine
        .request_token("authorization_code", &web_credentials(), &params)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::StoreUnavailable));
    assert!(err.is_retriable());

    // Client credentials never touch the grant store
    assert!(engine
        .request_token("client_credentials", &game_credentials(), &client_credentials_params(None))
        .await
        .is_ok());
}
