//! Full HTTP surface and its OpenAPI document.

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::oauth::{oauth_router, OAuthState};
use crate::shared::health_api::health_router;
use crate::shared::well_known_api::{well_known_router, WellKnownState};

#[derive(OpenApi)]
#[openapi(
    info(title = "Identity Server", description = "OAuth 2.0 / OpenID Connect authorization server"),
    paths(
        crate::oauth::api::authorize_get,
        crate::oauth::api::authorize_post,
        crate::oauth::api::external_callback,
        crate::oauth::api::token,
        crate::oauth::api::revocation,
        crate::oauth::api::userinfo,
        crate::shared::well_known_api::get_openid_configuration,
        crate::shared::well_known_api::get_jwks,
        crate::shared::health_api::health,
    ),
    tags(
        (name = "oauth", description = "Authorization, token, revocation and userinfo endpoints"),
        (name = "well-known", description = "Discovery and signing keys"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn build_router(oauth: OAuthState, well_known: WellKnownState) -> Router {
    Router::new()
        .merge(oauth_router(oauth))
        .merge(well_known_router(well_known))
        .merge(health_router())
        .route("/api-docs/openapi.json", get(openapi_json))
}
