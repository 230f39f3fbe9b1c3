//! OAuth/OIDC endpoint handlers.
//!
//! Resource-owner authentication arrives as form fields or is delegated to
//! an external provider; rendering a login page is left to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Form, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::idp::PendingAuthorizations;
use crate::oauth::client_auth::resolve_client_credentials;
use crate::protocol::authorize::error_redirect_url;
use crate::protocol::{AuthorizeRequest, ConsentDecision, ProtocolEngine, TokenParams};
use crate::shared::error::{AuthError, ErrorResponse};
use crate::shared::middleware::BearerToken;

#[derive(Clone)]
pub struct OAuthState {
    pub engine: Arc<ProtocolEngine>,
    pub pending: Arc<PendingAuthorizations>,
    /// Absolute URL of the external login callback
    pub callback_uri: String,
}

impl OAuthState {
    pub fn new(engine: Arc<ProtocolEngine>, pending: Arc<PendingAuthorizations>, external_base_url: &str) -> Self {
        Self {
            engine,
            pending,
            callback_uri: format!("{}/connect/external/callback", external_base_url.trim_end_matches('/')),
        }
    }
}

/// Authorization request parameters (query or form)
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// Delegate authentication to this external provider
    pub provider: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Time-based one-time code
    pub otp: Option<String>,
    /// `granted` or `denied`
    pub consent: Option<String>,
    pub remember_consent: Option<String>,
}

impl AuthorizeParams {
    fn to_request(&self) -> AuthorizeRequest {
        let mut request = AuthorizeRequest::new(
            self.client_id.clone(),
            self.redirect_uri.clone(),
            self.scope.clone().unwrap_or_default(),
        );
        request.response_type = self.response_type.clone();
        request.state = self.state.clone();
        request.nonce = self.nonce.clone();
        request.code_challenge = self.code_challenge.clone();
        request.code_challenge_method = self.code_challenge_method.clone();
        request.consent = self.consent.as_deref().and_then(ConsentDecision::parse);
        request.remember_consent = matches!(self.remember_consent.as_deref(), Some("true" | "on" | "1"));
        request
    }
}

/// Token request (form-urlencoded)
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenForm {
    #[serde(default)]
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    /// PKCE code verifier
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Revocation request (RFC 7009)
#[derive(Debug, Deserialize, ToSchema)]
pub struct RevocationForm {
    #[serde(default)]
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// Error shown to the user agent when the redirect URI cannot be trusted
fn direct_error(err: &AuthError) -> Response {
    let status = match err {
        AuthError::StoreUnavailable | AuthError::Internal { .. } => err.status_code(),
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ErrorResponse::from(err))).into_response()
}

fn redirect_error(request: &AuthorizeRequest, err: &AuthError) -> Response {
    Redirect::to(&error_redirect_url(&request.redirect_uri, err, request.state.as_deref())).into_response()
}

/// Authorization endpoint (query)
#[utoipa::path(
    get,
    path = "/connect/authorize",
    tag = "oauth",
    params(AuthorizeParams),
    responses(
        (status = 303, description = "Redirect to the client with a code or an error"),
        (status = 400, description = "Unknown client or unregistered redirect URI", body = ErrorResponse)
    )
)]
pub async fn authorize_get(State(state): State<OAuthState>, Query(params): Query<AuthorizeParams>) -> Response {
    handle_authorize(state, params).await
}

/// Authorization endpoint (form post)
#[utoipa::path(
    post,
    path = "/connect/authorize",
    tag = "oauth",
    request_body(content = AuthorizeParams, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Redirect to the client with a code or an error"),
        (status = 400, description = "Unknown client or unregistered redirect URI", body = ErrorResponse)
    )
)]
pub async fn authorize_post(State(state): State<OAuthState>, Form(params): Form<AuthorizeParams>) -> Response {
    handle_authorize(state, params).await
}

async fn handle_authorize(state: OAuthState, params: AuthorizeParams) -> Response {
    let request = params.to_request();

    if let Err(err) = state.engine.validate_redirect(&request).await {
        return direct_error(&err);
    }

    if let Some(provider_name) = params.provider.as_deref() {
        let Some(provider) = state.engine.external_providers().get(provider_name) else {
            return redirect_error(&request, &AuthError::invalid_request("Unknown identity provider"));
        };
        let pending_state = state.pending.insert(request, provider_name);
        info!(provider = %provider_name, "Redirecting to external identity provider");
        return Redirect::to(&provider.challenge_url(&pending_state, &state.callback_uri)).into_response();
    }

    let (Some(username), Some(password)) = (params.username.as_deref(), params.password.as_deref()) else {
        return redirect_error(&request, &AuthError::LoginRequired);
    };

    let user = match state
        .engine
        .credentials()
        .authenticate(username, password, params.otp.as_deref())
        .await
    {
        Ok(user) => user,
        Err(err) => return redirect_error(&request, &err),
    };

    complete_authorization(&state, &request, &user).await
}

async fn complete_authorization(state: &OAuthState, request: &AuthorizeRequest, user: &crate::user::User) -> Response {
    match state.engine.authorize(request, user).await {
        Ok(response) => Redirect::to(&response.redirect_url()).into_response(),
        Err(err) => {
            if matches!(err, AuthError::Internal { .. }) {
                error!(error = %err, "Authorization failed");
            }
            redirect_error(request, &err)
        }
    }
}

/// Return leg from an external identity provider
#[utoipa::path(
    get,
    path = "/connect/external/callback",
    tag = "oauth",
    responses(
        (status = 303, description = "Redirect to the client with a code or an error"),
        (status = 400, description = "Unknown or expired state", body = ErrorResponse)
    )
)]
pub async fn external_callback(
    State(state): State<OAuthState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(pending) = params.get("state").and_then(|s| state.pending.take(s)) else {
        warn!("External login callback with unknown or expired state");
        return direct_error(&AuthError::invalid_request("Unknown or expired state"));
    };

    let Some(provider) = state.engine.external_providers().get(&pending.provider) else {
        return redirect_error(&pending.request, &AuthError::invalid_request("Unknown identity provider"));
    };

    let identity = match provider.authenticate(&params).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(provider = %pending.provider, error = %err, "External authentication failed");
            return redirect_error(&pending.request, &AuthError::access_denied("External authentication failed"));
        }
    };

    let user = match state.engine.external_login(&identity).await {
        Ok(user) => user,
        Err(err) => return redirect_error(&pending.request, &err),
    };

    complete_authorization(&state, &pending.request, &user).await
}

/// Token endpoint
#[utoipa::path(
    post,
    path = "/connect/token",
    tag = "oauth",
    request_body(content = TokenForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = crate::protocol::TokenResult),
        (status = 400, description = "Invalid request or grant", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 503, description = "Store unavailable, retry", body = ErrorResponse)
    )
)]
pub async fn token(State(state): State<OAuthState>, headers: HeaderMap, Form(form): Form<TokenForm>) -> Response {
    let credentials = match resolve_client_credentials(&headers, form.client_id.as_deref(), form.client_secret.as_deref()) {
        Ok(credentials) => credentials,
        Err(err) => return no_store(err.into_response()),
    };

    let params = TokenParams {
        code: form.code,
        redirect_uri: form.redirect_uri,
        code_verifier: form.code_verifier,
        refresh_token: form.refresh_token,
        scope: form.scope,
    };

    let response = match state.engine.request_token(&form.grant_type, &credentials, &params).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            if matches!(err, AuthError::Internal { .. }) {
                error!(error = %err, grant_type = %form.grant_type, "Token request failed");
            }
            err.into_response()
        }
    };
    no_store(response)
}

/// Revocation endpoint
#[utoipa::path(
    post,
    path = "/connect/revocation",
    tag = "oauth",
    request_body(content = RevocationForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token revoked or unknown"),
        (status = 401, description = "Client authentication failed", body = ErrorResponse)
    )
)]
pub async fn revocation(State(state): State<OAuthState>, headers: HeaderMap, Form(form): Form<RevocationForm>) -> Response {
    let result = async {
        let credentials = resolve_client_credentials(&headers, form.client_id.as_deref(), form.client_secret.as_deref())?;
        state
            .engine
            .revoke_token(&credentials, &form.token, form.token_type_hint.as_deref())
            .await
    }
    .await;

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

/// UserInfo endpoint
#[utoipa::path(
    get,
    path = "/connect/userinfo",
    tag = "oauth",
    responses(
        (status = 200, description = "Claims about the authenticated user"),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn userinfo(State(state): State<OAuthState>, BearerToken(token): BearerToken) -> Response {
    match state.engine.user_info(&token).await {
        Ok(claims) => Json(claims).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn oauth_router(state: OAuthState) -> Router {
    Router::new()
        .route("/connect/authorize", get(authorize_get).post(authorize_post))
        .route("/connect/external/callback", get(external_callback))
        .route("/connect/token", post(token))
        .route("/connect/revocation", post(revocation))
        .route("/connect/userinfo", get(userinfo).post(userinfo))
        .with_state(state)
}
