//! Well-Known Endpoints
//!
//! OpenID Connect discovery and the published signing key set.
//! - /.well-known/openid-configuration
//! - /.well-known/openid-configuration/jwks

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::token::{Jwks, TokenIssuer};

/// OpenID Connect Discovery Document
#[derive(Debug, Serialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

#[derive(Clone)]
pub struct WellKnownState {
    pub issuer: Arc<TokenIssuer>,
    /// Public base URL the endpoints are reachable at
    pub external_base_url: String,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = "well-known",
    responses(
        (status = 200, description = "OpenID configuration", body = OpenIdConfiguration)
    )
)]
pub async fn get_openid_configuration(State(state): State<WellKnownState>) -> Json<OpenIdConfiguration> {
    let base_url = state.external_base_url.trim_end_matches('/');

    Json(OpenIdConfiguration {
        issuer: state.issuer.issuer_uri().to_string(),
        authorization_endpoint: format!("{}/connect/authorize", base_url),
        token_endpoint: format!("{}/connect/token", base_url),
        userinfo_endpoint: format!("{}/connect/userinfo", base_url),
        revocation_endpoint: format!("{}/connect/revocation", base_url),
        jwks_uri: format!("{}/.well-known/openid-configuration/jwks", base_url),
        response_types_supported: strings(&["code"]),
        response_modes_supported: strings(&["query"]),
        subject_types_supported: strings(&["public"]),
        id_token_signing_alg_values_supported: strings(&["RS256"]),
        scopes_supported: strings(&["openid", "profile", "email", "offline_access"]),
        token_endpoint_auth_methods_supported: strings(&["client_secret_basic", "client_secret_post", "none"]),
        grant_types_supported: strings(&["authorization_code", "client_credentials", "refresh_token"]),
        claims_supported: strings(&[
            "sub", "iss", "aud", "exp", "iat", "auth_time", "nonce", "at_hash", "name", "email", "email_verified",
        ]),
        code_challenge_methods_supported: strings(&["S256", "plain"]),
    })
}

/// Clients should cache this and refetch when they meet an unknown `kid`.
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration/jwks",
    tag = "well-known",
    responses(
        (status = 200, description = "JWKS", body = Jwks)
    )
)]
pub async fn get_jwks(State(state): State<WellKnownState>) -> Json<Jwks> {
    Json(state.issuer.key_ring().jwks())
}

pub fn well_known_router(state: WellKnownState) -> Router {
    Router::new()
        .route("/.well-known/openid-configuration", get(get_openid_configuration))
        .route("/.well-known/openid-configuration/jwks", get(get_jwks))
        .with_state(state)
}
