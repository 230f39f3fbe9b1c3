//! Bearer token extraction for resource APIs.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use super::error::AuthError;
use crate::token::{AccessTokenClaims, ResourceGuard, ResourceValidator};

/// Token from an `Authorization: Bearer` header
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Raw bearer token, unvalidated
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer_token)
            .map(|t| BearerToken(t.to_string()))
            .ok_or_else(|| AuthError::unauthorized("A bearer token is required"))
    }
}

/// Claims of a bearer token accepted by the router's `ResourceGuard`
#[derive(Debug, Clone)]
pub struct BearerAuth(pub AccessTokenClaims);

impl<S> FromRequestParts<S> for BearerAuth
where
    ResourceGuard: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let guard = ResourceGuard::from_ref(state);
        guard.validate(&token).await.map(BearerAuth)
    }
}
