//! Identity Server
//!
//! OAuth 2.0 / OpenID Connect authorization server process:
//! - Authorization, token, revocation and userinfo endpoints
//! - Discovery document and JWKS
//! - Background grant cleanup and signing key rotation
//!
//! Configuration is read from `config.toml` (or `IDS_CONFIG`) with `IDS_*`
//! environment overrides. See `ids_config::AppConfig::example_toml`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ids_common::{init_logging, shutdown_signal};
use ids_config::{AppConfig, ConfigLoader};
use ids_core::idp::PendingAuthorizations;
use ids_core::{
    build_router, initialize_indexes, Argon2Config, CleanupConfig, CredentialService, DevDataSeeder, EngineConfig,
    GrantCleanupTask, IssuerConfig, KeyRing, KeyRingConfig, MongoClientStore, MongoGrantStore, MongoResourceStore,
    MongoUserStore, OAuthState, PasswordService, ProtocolEngine, TokenIssuer, TokenValidator, WellKnownState,
};

/// How often the key ring checks whether rotation is due
const KEY_ROTATION_CHECK: Duration = Duration::from_secs(3600);

fn load_key_ring(config: &AppConfig) -> Result<KeyRing> {
    let issuer = &config.issuer;
    let ring_config = KeyRingConfig {
        rotation_period: chrono::Duration::days(issuer.key_rotation_days),
        retention: chrono::Duration::days(issuer.key_retention_days),
        key_dir: (!issuer.key_dir.is_empty()).then(|| PathBuf::from(&issuer.key_dir)),
        auto_rotate: true,
    };

    let ring = if !issuer.private_key_path.is_empty() {
        info!(path = %issuer.private_key_path, "Loading signing key from PEM files");
        KeyRing::from_pem_files(
            Path::new(&issuer.private_key_path),
            Path::new(&issuer.public_key_path),
            ring_config,
        )?
    } else {
        KeyRing::load_or_generate(ring_config)?
    };
    Ok(ring)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("ids-server");

    let config = match std::env::args().nth(1) {
        Some(path) => ConfigLoader::with_path(path).load()?,
        None => ConfigLoader::new().load()?,
    };
    info!(issuer = %config.issuer.issuer_uri, dev_mode = config.dev_mode, "Starting Identity Server");

    let store_timeout = Duration::from_millis(config.store.timeout_ms);

    info!("Connecting to MongoDB: {}/{}", config.mongodb.uri, config.mongodb.database);
    let mongo_client = mongodb::Client::with_uri_str(&config.mongodb.uri).await?;
    let db = mongo_client.database(&config.mongodb.database);
    initialize_indexes(&db).await?;

    let users = Arc::new(MongoUserStore::new(&db));
    let clients = Arc::new(MongoClientStore::new(&db));
    let resources = Arc::new(MongoResourceStore::new(&db));
    let grants = Arc::new(MongoGrantStore::new(&db));
    info!("Stores initialized");

    let password_service = Arc::new(PasswordService::new(Argon2Config::default())?);

    if config.dev_mode && config.seed.enabled {
        let seeder = DevDataSeeder::new(clients.clone(), resources.clone(), users.clone(), password_service.clone());
        if let Err(e) = seeder.seed_from_file(Path::new(&config.seed.fixture_path)).await {
            warn!(error = %e, "Dev data seeding failed");
        }
    } else if config.seed.enabled {
        warn!("Seeding is only performed in dev mode, skipping");
    }

    let key_ring = Arc::new(load_key_ring(&config)?);
    let mut issuer_config = IssuerConfig::new(&config.issuer.issuer_uri);
    issuer_config.access_token_lifetime = chrono::Duration::seconds(config.issuer.access_token_lifetime_secs);
    issuer_config.identity_token_lifetime = chrono::Duration::seconds(config.issuer.identity_token_lifetime_secs);
    let token_issuer = Arc::new(TokenIssuer::new(issuer_config, key_ring.clone()));
    let validator = Arc::new(
        TokenValidator::new(token_issuer.issuer_uri(), key_ring.clone()).with_leeway(config.issuer.clock_skew_secs),
    );
    let credentials = Arc::new(CredentialService::new(users, password_service, store_timeout)?);
    info!(kid = %key_ring.signing_key().kid, "Token services initialized");

    let engine_config = EngineConfig {
        store_timeout,
        authorization_code_lifetime: chrono::Duration::seconds(config.issuer.authorization_code_lifetime_secs),
        refresh_token_lifetime: chrono::Duration::seconds(config.issuer.refresh_token_lifetime_secs),
        consent_lifetime: chrono::Duration::seconds(config.issuer.consent_lifetime_secs),
    };
    let engine = Arc::new(ProtocolEngine::new(
        engine_config,
        clients,
        resources,
        grants.clone(),
        credentials,
        token_issuer.clone(),
        validator,
    ));

    let pending = Arc::new(PendingAuthorizations::default());
    let oauth_state = OAuthState::new(engine, pending.clone(), &config.issuer.external_base_url);
    let well_known_state = WellKnownState {
        issuer: token_issuer,
        external_base_url: config.issuer.external_base_url.clone(),
    };
    let app = build_router(oauth_state, well_known_state).layer(TraceLayer::new_for_http());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cleanup = GrantCleanupTask::new(
        grants,
        CleanupConfig {
            enabled: config.cleanup.enabled,
            interval: Duration::from_secs(config.cleanup.interval_secs),
            grace_period: Duration::from_secs(config.cleanup.grace_period_secs.max(0) as u64),
            batch_size: config.cleanup.batch_size as usize,
            store_timeout,
        },
    )
    .with_pending(pending);
    let cleanup_task = tokio::spawn(cleanup.run(shutdown_rx.clone()));
    let rotation_task = tokio::spawn(key_ring.run_rotation(KEY_ROTATION_CHECK, shutdown_rx));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Identity server listening on http://{}", addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(cleanup_task, rotation_task);

    info!("Identity server shutdown complete");
    Ok(())
}
